use crate::models::DeviceStatus;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Prober de reachability : un ping système par device, borné par timeout.
/// Toute erreur (spawn, timeout, code retour) est absorbée en `Down` ; le
/// retry éventuel appartient à la boucle de monitoring, pas au prober.
#[derive(Debug, Clone)]
pub struct Prober {
    timeout: Duration,
}

impl Prober {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub async fn probe(&self, ip: &str) -> DeviceStatus {
        let mut cmd = Command::new("ping");
        #[cfg(target_os = "windows")]
        cmd.args(["-n", "1", "-w", &self.timeout.as_millis().to_string()]);
        #[cfg(not(target_os = "windows"))]
        cmd.args(["-c", "1", "-W", &self.timeout.as_secs().to_string()]);
        cmd.arg(ip)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => DeviceStatus::Up,
            Ok(Ok(_)) => DeviceStatus::Down,
            Ok(Err(e)) => {
                eprintln!("[probe] ping {} failed to run: {}", ip, e);
                DeviceStatus::Down
            }
            // timeout : process tué par kill_on_drop
            Err(_) => DeviceStatus::Down,
        }
    }
}
