use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

use freedns_bot_core::Credentials;

const USERNAME_LEN: usize = 10;
const PASSWORD_LEN: usize = 12;
const USERNAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Fresh random credentials: 10 lowercase alphanumerics for the username,
/// 12 mixed-case alphanumerics for the password.
pub fn generate_credentials() -> Credentials {
    generate_credentials_with(&mut rand::thread_rng())
}

pub fn generate_credentials_with<R: Rng + ?Sized>(rng: &mut R) -> Credentials {
    let username = (0..USERNAME_LEN)
        .map(|_| USERNAME_CHARSET[rng.gen_range(0..USERNAME_CHARSET.len())] as char)
        .collect();
    let password = Alphanumeric.sample_string(rng, PASSWORD_LEN);

    Credentials { username, password }
}
