use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::modules::adapter::factory::ProviderFactory;
use crate::modules::adapter::{AdapterConfig, EmailProvider, MailProvider, Protocol};
use crate::modules::email::model::Email;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::raise_error;

/// Scripted remote mailbox shared between a test and the adapters it hands out.
#[derive(Default)]
pub struct FakeMailbox {
    pub emails: Mutex<Vec<Email>>,
    pub connect_error: Mutex<Option<ErrorCode>>,
    /// `since` of every `fetch_emails` call.
    pub fetch_calls: Mutex<Vec<Option<i64>>>,
    pub disconnects: Mutex<usize>,
    /// Configs the factory received.
    pub configs: Mutex<Vec<AdapterConfig>>,
    /// Holds every `fetch_emails` call this long before answering.
    pub fetch_delay: Mutex<Option<Duration>>,
}

impl FakeMailbox {
    pub fn with_emails(emails: Vec<Email>) -> Arc<Self> {
        let mailbox = Self::default();
        *mailbox.emails.lock().unwrap() = emails;
        Arc::new(mailbox)
    }

    pub fn fail_connect(&self, code: ErrorCode) {
        *self.connect_error.lock().unwrap() = Some(code);
    }

    pub fn last_since(&self) -> Option<i64> {
        self.fetch_calls.lock().unwrap().last().copied().flatten()
    }
}

pub struct FakeProvider {
    mailbox: Arc<FakeMailbox>,
    protocol: Protocol,
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn connect(&mut self) -> MailFusionResult<()> {
        match *self.mailbox.connect_error.lock().unwrap() {
            Some(code) => Err(raise_error!("scripted connect failure".into(), code)),
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> MailFusionResult<()> {
        *self.mailbox.disconnects.lock().unwrap() += 1;
        Ok(())
    }

    async fn fetch_emails(
        &mut self,
        since: Option<i64>,
        limit: usize,
    ) -> MailFusionResult<Vec<Email>> {
        self.mailbox.fetch_calls.lock().unwrap().push(since);
        let delay = *self.mailbox.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let emails = self.mailbox.emails.lock().unwrap();
        Ok(emails.iter().take(limit).cloned().collect())
    }

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email> {
        self.mailbox
            .emails
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.provider_id == provider_id)
            .cloned()
            .ok_or_else(|| raise_error!(provider_id.to_string(), ErrorCode::ResourceNotFound))
    }

    async fn test_connection(&self) -> MailFusionResult<()> {
        match *self.mailbox.connect_error.lock().unwrap() {
            Some(code) => Err(raise_error!("scripted test failure".into(), code)),
            None => Ok(()),
        }
    }

    fn provider_type(&self) -> EmailProvider {
        EmailProvider::Generic
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }
}

pub struct FakeFactory {
    pub mailbox: Arc<FakeMailbox>,
}

impl ProviderFactory for FakeFactory {
    fn create(&self, config: AdapterConfig) -> MailFusionResult<Box<dyn MailProvider>> {
        let protocol = config.protocol;
        self.mailbox.configs.lock().unwrap().push(config);
        Ok(Box::new(FakeProvider {
            mailbox: self.mailbox.clone(),
            protocol,
        }))
    }
}

/// Minimal remote message.
pub fn sample_email(provider_id: &str, subject: &str, received_at: i64) -> Email {
    Email {
        provider_id: provider_id.to_string(),
        subject: subject.to_string(),
        from_address: "sender@example.com".to_string(),
        text_body: Some(format!("Body of {}", subject)),
        received_at,
        sent_at: received_at,
        ..Default::default()
    }
    .normalize(received_at)
}
