//! Scripted gateway for service and router tests.

use super::traits::ModelGateway;
use crate::conversation::Turn;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

pub struct StubGateway {
    reply: Mutex<Result<String>>,
    system_role: bool,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl StubGateway {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(text.to_string())),
            system_role: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: Error) -> Self {
        Self {
            reply: Mutex::new(Err(error)),
            system_role: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_system_role(mut self) -> Self {
        self.system_role = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<Vec<Turn>> {
        self.calls.lock().last().cloned()
    }
}

fn clone_result(result: &Result<String>) -> Result<String> {
    match result {
        Ok(text) => Ok(text.clone()),
        Err(Error::InvalidInput(m)) => Err(Error::InvalidInput(m.clone())),
        Err(Error::NotFound { kind, id }) => Err(Error::not_found(*kind, id.clone())),
        Err(Error::UpstreamUnavailable(m)) => Err(Error::UpstreamUnavailable(m.clone())),
        Err(Error::Upstream {
            detail,
            available_models,
        }) => Err(Error::Upstream {
            detail: detail.clone(),
            available_models: available_models.clone(),
        }),
        Err(Error::Config(m)) => Err(Error::Config(m.clone())),
    }
}

#[async_trait]
impl ModelGateway for StubGateway {
    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    fn supports_system_role(&self) -> bool {
        self.system_role
    }

    async fn generate(&self, turns: &[Turn]) -> Result<String> {
        self.calls.lock().push(turns.to_vec());
        clone_result(&self.reply.lock())
    }
}
