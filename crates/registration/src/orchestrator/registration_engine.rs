use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use freedns_bot_core::{
    AccountRequest, AppConfig, BotError, Credentials, CustomDomainTable, FlowOutcome, FlowRequest,
    InteractiveChannel, MailboxSession, SubdomainRequest, UserId,
};

use crate::captcha::CaptchaRelay;
use crate::credentials::generate_credentials;
use crate::domain_selector::{DomainSelector, ZoneChoice};
use crate::mailbox::{sender_filter, wait_for_activation, MailboxProvider};
use crate::registrar::{Registrar, RegistrarConnector};
use crate::session::FlowAbort;

use super::context::{FlowState, RegistrationSession};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_captcha_retries: u32,
    pub mailbox_domain: String,
    pub activation_timeout: Duration,
    pub poll_interval: Duration,
    pub activation_senders: Vec<String>,
    pub firstname: String,
    pub lastname: String,
    pub record_type: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_captcha_retries: 3,
            mailbox_domain: "smailpro.com".to_string(),
            activation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            activation_senders: vec!["freedns".to_string(), "afraid.org".to_string()],
            firstname: "Bot".to_string(),
            lastname: "User".to_string(),
            record_type: "A".to_string(),
        }
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_captcha_retries: config.captcha.max_retries,
            mailbox_domain: config.mailbox.domain.clone(),
            activation_timeout: config.activation_timeout(),
            poll_interval: config.mail_poll_interval(),
            activation_senders: config.mailbox.activation_senders.clone(),
            firstname: config.registrar.firstname.clone(),
            lastname: config.registrar.lastname.clone(),
            record_type: config.flow.record_type.clone(),
        }
    }
}

/// Drives mailbox setup, account creation, activation and subdomain
/// creation for one operator at a time per session.
pub struct RegistrationOrchestrator {
    config: OrchestratorConfig,
    connector: Arc<dyn RegistrarConnector>,
    mailbox: Arc<dyn MailboxProvider>,
    relay: CaptchaRelay,
    selector: DomainSelector,
    domains: CustomDomainTable,
}

impl RegistrationOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        connector: Arc<dyn RegistrarConnector>,
        mailbox: Arc<dyn MailboxProvider>,
        relay: CaptchaRelay,
    ) -> Self {
        Self {
            config,
            connector,
            mailbox,
            relay,
            selector: DomainSelector::new(),
            domains: CustomDomainTable::new(),
        }
    }

    pub fn with_selector(mut self, selector: DomainSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn domains(&self) -> &CustomDomainTable {
        &self.domains
    }

    /// Add a custom domain under an alias
    pub fn add_domain(&self, alias: &str, zone: &str) {
        self.domains.insert(alias, zone);
    }

    /// Run the whole flow. On error the session ends in `Failed` and the
    /// error is returned for the caller to report.
    pub async fn run(
        &self,
        session: &mut RegistrationSession,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        request: &FlowRequest,
    ) -> Result<FlowOutcome, BotError> {
        info!(user = %user, label = %request.label, "starting registration flow");

        let result = self.drive(session, channel, user, request).await;
        match &result {
            Ok(outcome) => info!(
                "registration finished in {}s: {} ({})",
                session.duration().num_seconds(),
                outcome,
                session.path()
            ),
            Err(e) => {
                session.transition(FlowState::Failed(e.to_string()), None);
                warn!("registration failed: {} ({})", e, session.path());
            }
        }

        result
    }

    async fn drive(
        &self,
        session: &mut RegistrationSession,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        request: &FlowRequest,
    ) -> Result<FlowOutcome, BotError> {
        let abort = session.abort().clone();
        let registrar = self.connector.connect()?;
        let registrar = registrar.as_ref();
        debug!("connected to registrar {}", registrar.name());

        let mailbox = self.setup_mailbox(session, channel).await?;
        session.transition(FlowState::MailboxReady, Some(mailbox.address.clone()));

        let credentials = self
            .create_account(registrar, channel, user, &mailbox.address, &abort)
            .await?;
        session.transition(FlowState::AccountSubmitted, Some(credentials.username.clone()));
        send(channel, "✅ Account created! Waiting for activation email...").await;
        send(
            channel,
            &format!(
                "✅ FreeDNS account: `{}` / `{}`",
                credentials.username, credentials.password
            ),
        )
        .await;

        session.transition(FlowState::AwaitingActivation, None);
        self.activate_account(registrar, channel, &mailbox, session.read_messages_mut(), &abort)
            .await?;
        session.transition(FlowState::Activated, None);

        abort.check()?;
        registrar.login(&credentials).await?;

        let (domain, zone_id) = self.resolve_zone(registrar, request.alias.as_deref()).await?;
        session.transition(FlowState::SubdomainReady, Some(domain.clone()));

        let fqdn = self
            .create_subdomain(registrar, channel, user, request, &domain, zone_id, &abort)
            .await?;
        session.transition(FlowState::Done, Some(fqdn.clone()));

        Ok(FlowOutcome {
            fqdn,
            destination: request.destination,
            credentials,
            email: mailbox.address,
        })
    }

    /// Create the session's mailbox, or hand back the one it already has
    /// without contacting the provider.
    pub async fn setup_mailbox(
        &self,
        session: &mut RegistrationSession,
        channel: &dyn InteractiveChannel,
    ) -> Result<MailboxSession, BotError> {
        if let Some(existing) = session.mailbox() {
            let existing = existing.clone();
            send(channel, &format!("📧 Reusing email: {}", existing.address)).await;
            return Ok(existing);
        }

        send(
            channel,
            &format!(
                "📧 Creating temporary SmailPro email with domain `{}`...",
                self.config.mailbox_domain
            ),
        )
        .await;

        let created = self.mailbox.create_mailbox(&self.config.mailbox_domain).await?;
        session.set_mailbox(created.clone());
        send(channel, &format!("✅ Email created: {}", created.address)).await;

        Ok(created)
    }

    /// CAPTCHA-gated account submission with fresh credentials per attempt
    pub async fn create_account(
        &self,
        registrar: &dyn Registrar,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        email: &str,
        abort: &FlowAbort,
    ) -> Result<Credentials, BotError> {
        self.captcha_loop(registrar, channel, user, "account creation", abort, |captcha_code| {
            let request = AccountRequest {
                captcha_code,
                firstname: self.config.firstname.clone(),
                lastname: self.config.lastname.clone(),
                credentials: generate_credentials(),
                email: email.to_string(),
            };
            async move {
                let submitted = registrar.create_account(&request).await;
                submitted.map(|()| request.credentials)
            }
        })
        .await
    }

    /// Wait for an activation mail not read before and hand its code to
    /// the registrar
    pub async fn activate_account(
        &self,
        registrar: &dyn Registrar,
        channel: &dyn InteractiveChannel,
        mailbox: &MailboxSession,
        read_messages: &mut HashSet<String>,
        abort: &FlowAbort,
    ) -> Result<(), BotError> {
        send(channel, "📨 Waiting for FreeDNS activation email...").await;

        let code = wait_for_activation(
            self.mailbox.as_ref(),
            mailbox,
            sender_filter(&self.config.activation_senders),
            read_messages,
            self.config.activation_timeout,
            self.config.poll_interval,
            abort,
        )
        .await?;

        let Some(code) = code else {
            return Err(BotError::ActivationTimeout(self.config.activation_timeout.as_secs()));
        };

        registrar.activate_account(code).await?;
        send(channel, "✅ Account activated!").await;
        Ok(())
    }

    /// Target zone name and id for the subdomain
    pub async fn resolve_zone(
        &self,
        registrar: &dyn Registrar,
        alias: Option<&str>,
    ) -> Result<(String, u64), BotError> {
        let choice = self
            .selector
            .resolve(alias, &self.domains, || registrar.get_registry())
            .await?;

        match choice {
            ZoneChoice::Custom(domain) => {
                let id = registrar.get_domain_id(&domain).await?;
                Ok((domain, id))
            }
            ZoneChoice::Registry(zone) => Ok((zone.domain, zone.id)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_subdomain(
        &self,
        registrar: &dyn Registrar,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        request: &FlowRequest,
        domain: &str,
        zone_id: u64,
        abort: &FlowAbort,
    ) -> Result<String, BotError> {
        let purpose = format!("subdomain {}", request.label);
        let fqdn = format!("{}.{}", request.label, domain);

        self.captcha_loop(registrar, channel, user, &purpose, abort, |captcha_code| {
            let record = SubdomainRequest {
                label: request.label.clone(),
                zone_id,
                record_type: self.config.record_type.clone(),
                destination: request.destination,
            };
            async move { registrar.create_subdomain(&captcha_code, &record).await }
        })
        .await?;

        send(
            channel,
            &format!("✅ Subdomain created: `{}` → {}", fqdn, request.destination),
        )
        .await;
        Ok(fqdn)
    }

    /// Up to `max_captcha_retries` attempts, each with a freshly fetched
    /// challenge. Empty or missing answers use up an attempt without calling
    /// `submit`; attempt-scoped errors are reported and the next attempt begins.
    #[allow(clippy::too_many_arguments)]
    async fn captcha_loop<T, F, Fut>(
        &self,
        registrar: &dyn Registrar,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        purpose: &str,
        abort: &FlowAbort,
        mut submit: F,
    ) -> Result<T, BotError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, BotError>>,
    {
        let max_attempts = self.config.max_captcha_retries;

        for attempt in 0..max_attempts {
            abort.check()?;

            let challenge = match registrar.get_captcha().await {
                Ok(challenge) => challenge,
                Err(e) if e.is_attempt_scoped() => {
                    warn!("CAPTCHA fetch failed for {}: {}", purpose, e);
                    send(channel, &format!("⚠️ Error: {}", e)).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let answer = self
                .relay
                .relay_challenge(channel, user, challenge, purpose, attempt, max_attempts, abort)
                .await?;
            let Some(code) = answer.filter(|c| !c.is_empty()) else {
                info!("no usable CAPTCHA answer for {} (attempt {})", purpose, attempt + 1);
                continue;
            };

            match submit(code).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_attempt_scoped() => {
                    warn!("{} attempt {} rejected: {}", purpose, attempt + 1, e);
                    send(channel, &format!("⚠️ Error: {}", e)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BotError::CaptchaExhausted {
            purpose: purpose.to_string(),
            attempts: max_attempts,
        })
    }
}

async fn send(channel: &dyn InteractiveChannel, text: &str) {
    if let Err(e) = channel.send(text).await {
        warn!("failed to post progress to {}: {}", channel.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::tests::{ScriptedChannel, PNG};
    use crate::mailbox::tests::FakeMailbox;
    use async_trait::async_trait;
    use freedns_bot_core::{CaptchaChallenge, Message, Zone};
    use rand::rngs::mock::StepRng;
    use std::net::Ipv4Addr;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeState {
        captcha_fetches: usize,
        accounts: Vec<AccountRequest>,
        reject_accounts: usize,
        captcha_failures: usize,
        reject_subdomains: usize,
        reject_activation: bool,
        activations: Vec<String>,
        logins: Vec<Credentials>,
        registry_fetches: usize,
        domain_lookups: Vec<String>,
        subdomains: Vec<(String, SubdomainRequest)>,
    }

    #[derive(Clone, Default)]
    struct FakeRegistrar {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeRegistrar {
        fn rejecting_first_accounts(n: usize) -> Self {
            let registrar = Self::default();
            registrar.state.lock().unwrap().reject_accounts = n;
            registrar
        }

        fn configure(self, f: impl FnOnce(&mut FakeState)) -> Self {
            f(&mut *self.state.lock().unwrap());
            self
        }
    }

    #[async_trait]
    impl Registrar for FakeRegistrar {
        fn name(&self) -> &str {
            "fake"
        }

        async fn get_captcha(&self) -> Result<CaptchaChallenge, BotError> {
            let mut state = self.state.lock().unwrap();
            state.captcha_fetches += 1;
            if state.captcha_failures > 0 {
                state.captcha_failures -= 1;
                return Err(BotError::Transport("connection reset".into()));
            }
            Ok(CaptchaChallenge::new(PNG.to_vec()))
        }

        async fn create_account(&self, request: &AccountRequest) -> Result<(), BotError> {
            let mut state = self.state.lock().unwrap();
            state.accounts.push(request.clone());
            if state.reject_accounts > 0 {
                state.reject_accounts -= 1;
                return Err(BotError::RegistrarRejected("The security code was incorrect".into()));
            }
            Ok(())
        }

        async fn activate_account(&self, code: String) -> Result<(), BotError> {
            let mut state = self.state.lock().unwrap();
            state.activations.push(code);
            if state.reject_activation {
                return Err(BotError::RegistrarRejected("Invalid activation code".into()));
            }
            Ok(())
        }

        async fn login(&self, credentials: &Credentials) -> Result<(), BotError> {
            self.state.lock().unwrap().logins.push(credentials.clone());
            Ok(())
        }

        async fn get_registry(&self) -> Result<Vec<Zone>, BotError> {
            self.state.lock().unwrap().registry_fetches += 1;
            Ok(vec![
                Zone { id: 1, domain: "a.net".to_string() },
                Zone { id: 2, domain: "b.net".to_string() },
            ])
        }

        async fn get_domain_id(&self, domain: &str) -> Result<u64, BotError> {
            self.state.lock().unwrap().domain_lookups.push(domain.to_string());
            Ok(77)
        }

        async fn create_subdomain(
            &self,
            captcha_code: &str,
            request: &SubdomainRequest,
        ) -> Result<(), BotError> {
            let mut state = self.state.lock().unwrap();
            state.subdomains.push((captcha_code.to_string(), request.clone()));
            if state.reject_subdomains > 0 {
                state.reject_subdomains -= 1;
                return Err(BotError::RegistrarRejected("The security code was incorrect".into()));
            }
            Ok(())
        }
    }

    struct FakeConnector(FakeRegistrar);

    impl RegistrarConnector for FakeConnector {
        fn connect(&self) -> Result<Box<dyn Registrar>, BotError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    const ACTIVATION_MAIL: &str = "Welcome to FreeDNS!\n\
        Please visit http://freedns.afraid.org/signup/activate.php?XKQ93FJ20ALDPQWE8MZN1 \
        to activate your account.";

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            activation_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(registrar: &FakeRegistrar, mailbox: Arc<FakeMailbox>) -> RegistrationOrchestrator {
        RegistrationOrchestrator::new(
            test_config(),
            Arc::new(FakeConnector(registrar.clone())),
            mailbox,
            CaptchaRelay::new(Duration::from_secs(120)),
        )
        .with_selector(DomainSelector::with_rng(StepRng::new(0, 0)))
    }

    fn activation_mailbox() -> Arc<FakeMailbox> {
        let mut mailbox = FakeMailbox::new("a1b2@smailpro.com").with_mail(
            "m1",
            "dnsadmin@afraid.org",
            ACTIVATION_MAIL,
        );
        mailbox.deliver_after_polls = 2;
        Arc::new(mailbox)
    }

    fn user() -> UserId {
        "1001".to_string()
    }

    #[tokio::test]
    async fn test_end_to_end_random_zone() {
        let registrar = FakeRegistrar::default();
        let mailbox = activation_mailbox();
        let engine = orchestrator(&registrar, mailbox.clone());
        let channel = ScriptedChannel::new(vec![Some("h7Kp2"), Some(" q9-ZZ ")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let outcome = engine.run(&mut session, &channel, &user(), &request).await.unwrap();

        assert_eq!(outcome.fqdn, "mysub.a.net");
        assert_eq!(outcome.to_string(), "mysub.a.net → 203.0.113.9");
        assert_eq!(outcome.email, "a1b2@smailpro.com");
        assert_eq!(session.state(), &FlowState::Done);
        assert_eq!(
            session.path(),
            "INIT -> MAILBOX_READY -> ACCOUNT_SUBMITTED -> AWAITING_ACTIVATION -> ACTIVATED -> SUBDOMAIN_READY -> DONE"
        );

        let state = registrar.state.lock().unwrap();
        assert_eq!(state.captcha_fetches, 2);
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[0].captcha_code, "h7Kp2");
        assert_eq!(state.accounts[0].email, "a1b2@smailpro.com");
        assert_eq!(state.activations, vec!["XKQ93FJ20ALDPQWE8MZN1".to_string()]);
        assert_eq!(state.logins, vec![outcome.credentials.clone()]);
        assert_eq!(state.registry_fetches, 1);
        assert_eq!(
            state.subdomains,
            vec![(
                "q9ZZ".to_string(),
                SubdomainRequest {
                    label: "mysub".to_string(),
                    zone_id: 1,
                    record_type: "A".to_string(),
                    destination: Ipv4Addr::new(203, 0, 113, 9),
                }
            )]
        );
        assert_eq!(mailbox.creations.load(Ordering::SeqCst), 1);

        let transcript = channel.transcript();
        assert!(transcript.contains(&"✅ Email created: a1b2@smailpro.com".to_string()));
        assert!(transcript.contains(&"✅ Account activated!".to_string()));
        assert_eq!(
            transcript.last().unwrap(),
            "✅ Subdomain created: `mysub.a.net` → 203.0.113.9"
        );
    }

    #[tokio::test]
    async fn test_custom_alias_uses_domain_lookup() {
        let registrar = FakeRegistrar::default();
        let engine = orchestrator(&registrar, activation_mailbox());
        engine.add_domain("work", "example.org");
        let channel = ScriptedChannel::new(vec![Some("abc"), Some("def")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("198.51.100.4", "home", Some("WORK")).unwrap();

        let outcome = engine.run(&mut session, &channel, &user(), &request).await.unwrap();

        assert_eq!(outcome.fqdn, "home.example.org");
        let state = registrar.state.lock().unwrap();
        assert_eq!(state.registry_fetches, 0);
        assert_eq!(state.domain_lookups, vec!["example.org".to_string()]);
        assert_eq!(state.subdomains[0].1.zone_id, 77);
    }

    #[tokio::test]
    async fn test_mailbox_is_reused() {
        let registrar = FakeRegistrar::default();
        let mailbox = activation_mailbox();
        let engine = orchestrator(&registrar, mailbox.clone());
        let channel = ScriptedChannel::new(vec![]);
        let mut session = RegistrationSession::new(FlowAbort::never());

        let first = engine.setup_mailbox(&mut session, &channel).await.unwrap();
        let second = engine.setup_mailbox(&mut session, &channel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.address, "a1b2@smailpro.com");
        assert_eq!(mailbox.creations.load(Ordering::SeqCst), 1);
        assert_eq!(
            channel.transcript().last().unwrap(),
            "📧 Reusing email: a1b2@smailpro.com"
        );
    }

    #[tokio::test]
    async fn test_captcha_retries_are_bounded() {
        let registrar = FakeRegistrar::default();
        let engine = orchestrator(&registrar, activation_mailbox());
        // timeout, nothing alphanumeric, timeout
        let channel = ScriptedChannel::new(vec![None, Some(" -!- "), None, Some("never-read")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let err = engine.run(&mut session, &channel, &user(), &request).await.unwrap_err();

        assert!(matches!(err, BotError::CaptchaExhausted { attempts: 3, .. }));
        assert!(matches!(session.state(), FlowState::Failed(_)));
        let state = registrar.state.lock().unwrap();
        assert_eq!(state.captcha_fetches, 3);
        assert!(state.accounts.is_empty());
        assert_eq!(channel.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_attempt_rerolls_credentials() {
        let registrar = FakeRegistrar::rejecting_first_accounts(1);
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("bad1"), Some("good2")]);

        let credentials = engine
            .create_account(&registrar, &channel, &user(), "a1b2@smailpro.com", &FlowAbort::never())
            .await
            .unwrap();

        let state = registrar.state.lock().unwrap();
        assert_eq!(state.accounts.len(), 2);
        assert_ne!(state.accounts[0].credentials, state.accounts[1].credentials);
        assert_eq!(state.accounts[1].credentials, credentials);
        assert!(channel
            .transcript()
            .contains(&"⚠️ Error: registrar rejected the request: The security code was incorrect".to_string()));
    }

    #[tokio::test]
    async fn test_activation_timeout_fails_flow() {
        let registrar = FakeRegistrar::default();
        let engine = RegistrationOrchestrator::new(
            OrchestratorConfig {
                activation_timeout: Duration::from_millis(40),
                poll_interval: Duration::from_millis(10),
                ..OrchestratorConfig::default()
            },
            Arc::new(FakeConnector(registrar.clone())),
            Arc::new(FakeMailbox::new("a1b2@smailpro.com")),
            CaptchaRelay::new(Duration::from_secs(120)),
        );
        let channel = ScriptedChannel::new(vec![Some("abc")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let err = engine.run(&mut session, &channel, &user(), &request).await.unwrap_err();

        assert!(matches!(err, BotError::ActivationTimeout(0)));
        assert_eq!(
            session.path(),
            "INIT -> MAILBOX_READY -> ACCOUNT_SUBMITTED -> AWAITING_ACTIVATION -> FAILED"
        );
        assert!(registrar.state.lock().unwrap().activations.is_empty());
    }

    #[tokio::test]
    async fn test_reused_mailbox_never_resubmits_an_activation_code() {
        let registrar = FakeRegistrar::default();
        let mailbox = activation_mailbox();
        let engine = orchestrator(&registrar, mailbox.clone());
        let channel = ScriptedChannel::new(vec![Some("a1"), Some("b2"), Some("c3"), Some("d4")]);
        let mut session = RegistrationSession::new(FlowAbort::never());

        let first = FlowRequest::parse("203.0.113.9", "one", None).unwrap();
        engine.run(&mut session, &channel, &user(), &first).await.unwrap();

        mailbox.inbox.lock().unwrap().push((
            Message {
                id: "m2".to_string(),
                sender: "dnsadmin@afraid.org".to_string(),
                ..Default::default()
            },
            "Please visit http://freedns.afraid.org/signup/activate.php?QWERTYUIOPASDFGHJKL12".to_string(),
        ));
        session.begin_flow();
        let second = FlowRequest::parse("203.0.113.10", "two", None).unwrap();
        engine.run(&mut session, &channel, &user(), &second).await.unwrap();

        let state = registrar.state.lock().unwrap();
        assert_eq!(
            state.activations,
            vec!["XKQ93FJ20ALDPQWE8MZN1".to_string(), "QWERTYUIOPASDFGHJKL12".to_string()]
        );
        assert_eq!(state.accounts.len(), 2);
        assert_eq!(mailbox.creations.load(Ordering::SeqCst), 1);
        assert!(channel
            .transcript()
            .contains(&"📧 Reusing email: a1b2@smailpro.com".to_string()));
    }

    #[tokio::test]
    async fn test_subdomain_captcha_retries_are_bounded() {
        let registrar = FakeRegistrar::default();
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("acct1"), None, Some(""), None, Some("never-read")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let err = engine.run(&mut session, &channel, &user(), &request).await.unwrap_err();

        match err {
            BotError::CaptchaExhausted { purpose, attempts } => {
                assert_eq!(purpose, "subdomain mysub");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            session.path(),
            "INIT -> MAILBOX_READY -> ACCOUNT_SUBMITTED -> AWAITING_ACTIVATION -> ACTIVATED -> SUBDOMAIN_READY -> FAILED"
        );
        let state = registrar.state.lock().unwrap();
        // one for the account, three for the subdomain
        assert_eq!(state.captcha_fetches, 4);
        assert!(state.subdomains.is_empty());
        assert_eq!(channel.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_subdomain_is_retried() {
        let registrar = FakeRegistrar::default().configure(|s| s.reject_subdomains = 1);
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("acct1"), Some("wrong"), Some("right")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let outcome = engine.run(&mut session, &channel, &user(), &request).await.unwrap();

        assert_eq!(outcome.fqdn, "mysub.a.net");
        let state = registrar.state.lock().unwrap();
        assert_eq!(state.captcha_fetches, 3);
        let codes: Vec<&str> = state.subdomains.iter().map(|(code, _)| code.as_str()).collect();
        assert_eq!(codes, vec!["wrong", "right"]);
        assert!(channel
            .transcript()
            .contains(&"⚠️ Error: registrar rejected the request: The security code was incorrect".to_string()));
    }

    #[tokio::test]
    async fn test_captcha_fetch_failure_uses_an_attempt() {
        let registrar = FakeRegistrar::default().configure(|s| s.captcha_failures = 1);
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("k3y")]);

        let credentials = engine
            .create_account(&registrar, &channel, &user(), "a1b2@smailpro.com", &FlowAbort::never())
            .await
            .unwrap();

        let state = registrar.state.lock().unwrap();
        assert_eq!(state.captcha_fetches, 2);
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[0].captcha_code, "k3y");
        assert_eq!(state.accounts[0].credentials, credentials);
        assert_eq!(
            channel.transcript().first().unwrap(),
            "⚠️ Error: network error: connection reset"
        );
    }

    #[tokio::test]
    async fn test_captcha_fetch_failures_can_exhaust_attempts() {
        let registrar = FakeRegistrar::default().configure(|s| s.captcha_failures = 3);
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("never-read")]);

        let err = engine
            .create_account(&registrar, &channel, &user(), "a1b2@smailpro.com", &FlowAbort::never())
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::CaptchaExhausted { attempts: 3, .. }));
        assert_eq!(registrar.state.lock().unwrap().captcha_fetches, 3);
        assert_eq!(channel.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_activation_fails_without_retry() {
        let registrar = FakeRegistrar::default().configure(|s| s.reject_activation = true);
        let engine = orchestrator(&registrar, activation_mailbox());
        let channel = ScriptedChannel::new(vec![Some("acct1"), Some("never-read")]);
        let mut session = RegistrationSession::new(FlowAbort::never());
        let request = FlowRequest::parse("203.0.113.9", "mysub", None).unwrap();

        let err = engine.run(&mut session, &channel, &user(), &request).await.unwrap_err();

        assert!(matches!(err, BotError::RegistrarRejected(_)));
        assert_eq!(
            session.path(),
            "INIT -> MAILBOX_READY -> ACCOUNT_SUBMITTED -> AWAITING_ACTIVATION -> FAILED"
        );
        let state = registrar.state.lock().unwrap();
        assert_eq!(state.activations.len(), 1);
        assert!(state.logins.is_empty());
        assert_eq!(state.captcha_fetches, 1);
        assert!(state.subdomains.is_empty());
    }
}
