use crate::{
    modules::{
        context::Initialize,
        error::{code::ErrorCode, MailFusionResult},
    },
    raise_error,
};

pub struct MailFusionTls;

impl Initialize for MailFusionTls {
    async fn initialize() -> MailFusionResult<()> {
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
            .map_err(|_| {
                raise_error!(
                    "failed to set crypto provider".into(),
                    ErrorCode::InternalError
                )
            })
    }
}
