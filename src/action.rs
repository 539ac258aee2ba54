//! Leaf effects and the host collaborator seam.
//!
//! The engine does not know what a leaf node *does*, only when it finishes.
//! Everything with a real side effect — scene lookups, audio, animation, UI
//! mutation — lives behind the [`Host`] trait; the engine owns only the
//! built-in effects that touch its own state (delays, variable writes).

use core::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::variable::Value;

/// A leaf effect carried by an Action node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Waits for the given number of seconds.
    Delay {
        /// Duration in seconds; fractional values are honored.
        seconds: f64,
    },
    /// Writes a variable, creating it on first write.
    SetVariable {
        /// Variable name.
        variable: String,
        /// Value to write.
        value: Value,
    },
    /// Shows a message through the host (toast, caption, tutorial bubble).
    ShowMessage {
        /// Message text.
        text: String,
    },
    /// Invokes an arbitrary host effect by name.
    HostEffect {
        /// Effect name the host dispatches on.
        effect: String,
        /// Opaque parameters forwarded to the host.
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl Action {
    /// Returns the delay duration for `Delay` actions.
    #[must_use]
    pub fn delay_duration(&self) -> Option<Duration> {
        match self {
            Action::Delay { seconds } => Some(Duration::from_secs_f64(seconds.max(0.0))),
            _ => None,
        }
    }
}

/// Host environment collaborator.
///
/// Implementations bridge the engine to the embedding application. All
/// methods must be cheap to call with no subscribers attached; the engine
/// works against [`NullHost`] out of the box.
pub trait Host: Send + Sync {
    /// Runs a named effect with opaque parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] when the effect is unknown or fails. The
    /// runner treats this as an authoring error: it logs a warning and
    /// completes the node anyway.
    fn perform<'a>(
        &'a self,
        effect: &'a str,
        params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), HostError>>;

    /// Shows a message to the user.
    fn show_message(&self, _text: &str) {}

    /// Returns true if an object exists at the given host path.
    fn object_exists(&self, _path: &str) -> bool {
        false
    }

    /// Returns true if the object at the given host path exists and is
    /// active.
    fn object_active(&self, _path: &str) -> bool {
        false
    }

    /// Releases any listeners registered by in-flight effects.
    ///
    /// Called when a run starts and when it is stopped or reset, so that
    /// host-side callbacks (click handlers, animation-finished listeners)
    /// never outlive the node that registered them.
    fn reset(&self) {}
}

/// Host that performs nothing.
///
/// Unknown effects log a warning and succeed, so a graph authored against a
/// richer host still runs to completion here.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn perform<'a>(
        &'a self,
        effect: &'a str,
        _params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<(), HostError>> {
        Box::pin(async move {
            tracing::warn!(effect, "no host attached, effect skipped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_duration_clamps_negative() {
        let action = Action::Delay { seconds: -1.0 };
        assert_eq!(action.delay_duration(), Some(Duration::ZERO));

        let action = Action::Delay { seconds: 0.25 };
        assert_eq!(action.delay_duration(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn non_delay_has_no_duration() {
        let action = Action::ShowMessage { text: "hi".into() };
        assert_eq!(action.delay_duration(), None);
    }

    #[tokio::test]
    async fn null_host_swallows_effects() {
        let host = NullHost;
        let result = host.perform("play_sound", &serde_json::Value::Null).await;
        assert!(result.is_ok());
        assert!(!host.object_exists("/anything"));
    }
}
