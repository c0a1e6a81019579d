//! Desktop notifications using notify-rust.

use crate::platform::{Notifier, PlatformError};
use tracing::info;

const APP_NAME: &str = "clipocr";

/// Sends messages to the desktop notification daemon.
#[derive(Debug, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, message: &str) -> Result<(), PlatformError> {
        info!("{}", message);

        notify_rust::Notification::new()
            .summary(APP_NAME)
            .body(message)
            .appname(APP_NAME)
            .show()
            .map_err(|e| PlatformError::Notification(e.to_string()))?;

        Ok(())
    }
}
