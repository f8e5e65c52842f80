//! Queue Commands
//!
//! JSON command surface of the queue processor. A frontend sends one
//! [`QueueCommand`] per request and gets a [`CommandResponse`] back; queue
//! changes arrive separately as events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::queue::{JobDescriptor, QueueProcessor};
use crate::core::settings::{EncodingSettings, EncodingSettingsPatch, QualityPreset};
use crate::core::{CoreError, CoreResult, JobId};

/// Request sent to the queue processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum QueueCommand {
    AddItems {
        items: Vec<JobDescriptor>,
    },
    RemoveItem {
        id: JobId,
    },
    ClearQueue,
    ReorderItem {
        from: usize,
        to: usize,
    },
    RetryItem {
        id: JobId,
    },
    Start,
    Pause,
    Resume,
    CancelCurrent,
    UpdateSettings {
        settings: EncodingSettingsPatch,
    },
    ReplaceSettings {
        settings: EncodingSettings,
    },
    ApplyQualityPreset {
        preset: QualityPreset,
    },
    GetSettings,
    GetQueue,
    GetItem {
        id: JobId,
    },
    GetStats,
    GetState,
    CheckAvailability,
}

impl QueueCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddItems { .. } => "addItems",
            Self::RemoveItem { .. } => "removeItem",
            Self::ClearQueue => "clearQueue",
            Self::ReorderItem { .. } => "reorderItem",
            Self::RetryItem { .. } => "retryItem",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::CancelCurrent => "cancelCurrent",
            Self::UpdateSettings { .. } => "updateSettings",
            Self::ReplaceSettings { .. } => "replaceSettings",
            Self::ApplyQualityPreset { .. } => "applyQualityPreset",
            Self::GetSettings => "getSettings",
            Self::GetQueue => "getQueue",
            Self::GetItem { .. } => "getItem",
            Self::GetStats => "getStats",
            Self::GetState => "getState",
            Self::CheckAvailability => "checkAvailability",
        }
    }
}

/// Reply to a single command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: (!data.is_null()).then_some(data),
            error: None,
        }
    }

    pub fn failure(error: &CoreError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.to_ipc_error()),
        }
    }
}

/// Parse a JSON command
pub fn parse_command(raw: &str) -> CoreResult<QueueCommand> {
    serde_json::from_str(raw).map_err(|e| CoreError::InvalidCommand(e.to_string()))
}

/// Execute a command against the processor
pub async fn dispatch(processor: &Arc<QueueProcessor>, command: QueueCommand) -> CoreResult<Value> {
    debug!(command = command.name(), "Dispatching queue command");

    let value = match command {
        QueueCommand::AddItems { items } => json!({ "ids": processor.add_items(items) }),
        QueueCommand::RemoveItem { id } => {
            processor.remove_item(&id)?;
            Value::Null
        }
        QueueCommand::ClearQueue => json!({ "removed": processor.clear_queue() }),
        QueueCommand::ReorderItem { from, to } => {
            json!({ "moved": processor.reorder_item(from, to) })
        }
        QueueCommand::RetryItem { id } => json!({ "id": processor.retry(&id)? }),
        QueueCommand::Start => {
            processor.start();
            json!({ "state": processor.state() })
        }
        QueueCommand::Pause => {
            processor.pause();
            json!({ "state": processor.state() })
        }
        QueueCommand::Resume => {
            processor.resume();
            json!({ "state": processor.state() })
        }
        QueueCommand::CancelCurrent => json!({ "cancelled": processor.cancel_current() }),
        QueueCommand::UpdateSettings { settings } => {
            serde_json::to_value(processor.update_settings(&settings))?
        }
        QueueCommand::ReplaceSettings { settings } => {
            serde_json::to_value(processor.replace_settings(settings))?
        }
        QueueCommand::ApplyQualityPreset { preset } => {
            let patch = EncodingSettingsPatch::from_quality_preset(preset);
            serde_json::to_value(processor.update_settings(&patch))?
        }
        QueueCommand::GetSettings => serde_json::to_value(processor.settings())?,
        QueueCommand::GetQueue => serde_json::to_value(processor.get_queue())?,
        QueueCommand::GetItem { id } => {
            let item = processor
                .get_item(&id)
                .ok_or(CoreError::ItemNotFound(id))?;
            serde_json::to_value(item)?
        }
        QueueCommand::GetStats => serde_json::to_value(processor.get_stats())?,
        QueueCommand::GetState => json!({
            "state": processor.state(),
            "processing": processor.is_processing(),
        }),
        QueueCommand::CheckAvailability => {
            serde_json::to_value(processor.check_availability().await)?
        }
    };

    Ok(value)
}

/// Parse, execute and wrap one raw JSON command. Never fails.
pub async fn handle_json(processor: &Arc<QueueProcessor>, raw: &str) -> CommandResponse {
    let result = match parse_command(raw) {
        Ok(command) => dispatch(processor, command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => CommandResponse::success(data),
        Err(e) => {
            warn!("Queue command failed: {}", e);
            CommandResponse::failure(&e)
        }
    }
}
