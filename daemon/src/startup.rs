/// Launch-time handling of `-mode <token>`.
///
/// A second launch first offers the mode to an instance that is already
/// running. Only if nobody answers does this process start up itself, and it
/// then applies the mode as a manual change once the arbiter has made its
/// first pick, so the explicit request wins.
use std::sync::Arc;
use std::time::Duration;

use crate::actuator::{apply_blocking, ModeActuator};
use crate::client::CommandClient;
use crate::config::Config;
use crate::error::ActuatorError;
use crate::mode::{Mode, ModeOrigin};

/// Slack on top of the actuator timeout before the client stops waiting.
const RESPONSE_SLACK: Duration = Duration::from_secs(2);

/// Client aimed at the configured local port. The response wait covers the
/// server running the actuator command to its timeout.
pub fn local_client(config: &Config) -> CommandClient {
    CommandClient::local(config.ipc.port)
        .with_connect_timeout(config.ipc.connect_timeout())
        .with_response_timeout(config.actuator.timeout() + RESPONSE_SLACK)
}

/// Offers `mode` to a running instance. True means it was applied there and
/// this process has nothing left to do.
pub async fn hand_off(mode: Mode, client: &CommandClient) -> bool {
    let delivered = client.send_mode(mode).await;
    if delivered {
        tracing::info!(%mode, "mode handed to running instance");
    } else {
        tracing::debug!(%mode, "no running instance answered; starting up");
    }
    delivered
}

/// Applies a launch mode that could not be handed off. Call after the
/// arbiter's eager pass.
pub async fn apply_launch_mode(
    actuator: Arc<dyn ModeActuator>,
    mode: Mode,
) -> Result<(), ActuatorError> {
    apply_blocking(actuator, mode, ModeOrigin::Manual).await
}
