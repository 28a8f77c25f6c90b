use crate::health::HealthEvent;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs the advisory script on health events, without waiting for it
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    script: Option<PathBuf>,
}

impl Notifier {
    pub fn new(script: Option<PathBuf>) -> Self {
        Self { script }
    }

    /// `<script> <station> "<event> <date> <time>[ Begin was <date> <time>]"`
    pub fn notify(&self, event: &HealthEvent) {
        let Some(script) = self.script.clone() else {
            return;
        };
        let station = event.station.clone();
        let comment = event.comment();
        tokio::spawn(async move {
            let child = Command::new(&script)
                .arg(&station)
                .arg(&comment)
                .spawn();
            match child {
                Ok(mut child) => match child.wait().await {
                    Ok(status) if !status.success() => {
                        warn!("{}: {:?} exited with {}", station, script, status)
                    }
                    Ok(_) => debug!("{}: {:?} {}", station, script, comment),
                    Err(e) => warn!("{}: {:?} {}", station, script, e),
                },
                Err(e) => warn!("{}: cannot run {:?}: {}", station, script, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthEventKind;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn event() -> HealthEvent {
        HealthEvent {
            kind: HealthEventKind::BeginOutage,
            station: "WTZR0".to_string(),
            begin: Utc.with_ymd_and_hms(2024, 1, 5, 9, 40, 12).unwrap(),
            end: None,
        }
    }

    #[tokio::test]
    async fn test_no_script() {
        Notifier::default().notify(&event());
        Notifier::new(Some("/nonexistent/advise.sh".into())).notify(&event());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("advise.log");
        let script = dir.path().join("advise.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1|$2\" > {}\n", output.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .unwrap();

        Notifier::new(Some(script)).notify(&event());

        let mut content = String::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            content = std::fs::read_to_string(&output).unwrap_or_default();
            if !content.is_empty() {
                break;
            }
        }
        assert_eq!(content, "WTZR0|Begin_Outage 24-01-05 09:40:12\n");
    }
}
