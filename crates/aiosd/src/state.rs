//! Daemon state shared by every connection handler.

use crate::config::{AgentConfig, ProviderKind};
use crate::conversation::ConversationStore;
use crate::dispatcher::ActionDispatcher;
use crate::fallback::FallbackInterpreter;
use crate::provider::{self, ChatProvider};
use aios_common::hal::Hal;
use std::sync::Arc;
use std::time::Instant;

/// Read-only configuration plus the single mutable conversation store.
/// Handed to each handler as `Arc<AgentState>`.
pub struct AgentState {
    pub config: AgentConfig,
    pub history: ConversationStore,
    pub hal: Arc<dyn Hal>,
    pub provider: Option<Arc<dyn ChatProvider>>,
    pub dispatcher: ActionDispatcher,
    pub fallback: Arc<FallbackInterpreter>,
    pub started_at: Instant,
}

impl AgentState {
    pub fn new(
        config: AgentConfig,
        hal: Arc<dyn Hal>,
        provider: Option<Arc<dyn ChatProvider>>,
    ) -> Self {
        Self {
            history: ConversationStore::new(config.history_capacity),
            dispatcher: ActionDispatcher::new(Arc::clone(&hal), config.power_action_delay),
            fallback: Arc::new(FallbackInterpreter::new(
                Arc::clone(&hal),
                config.confirm_dangerous,
            )),
            hal,
            provider,
            config,
            started_at: Instant::now(),
        }
    }

    /// Build the HAL backend and provider the configuration names
    pub fn from_config(config: AgentConfig) -> Self {
        let hal = config.hal.build();
        let provider = provider::build_provider(&config);
        Self::new(config, hal, provider)
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider
            .as_ref()
            .map(|p| p.kind())
            .unwrap_or(ProviderKind::None)
    }

    pub fn model(&self) -> &str {
        self.provider
            .as_ref()
            .map(|p| p.model())
            .unwrap_or(self.config.model.as_str())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
