/**
 * INVENTORY SOURCE - Client du contrôleur d'inventaire réseau
 *
 * RÔLE : Récupère la liste des hôtes connus du contrôleur (échange ticket
 * POST /ticket puis GET /host avec X-Auth-Token). Disponibilité best-effort :
 * toute erreur devient InventoryUnavailable et la boucle de monitoring
 * bascule sur les probes directs.
 *
 * ARCHITECTURE : Enum à deux variantes — Controller (reqwest, deadline
 * explicite par requête) et ProbeOnly (toujours indisponible, force le
 * chemin probe local).
 */
use crate::config::ControllerConf;
use crate::models::InventoryHost;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("inventory unavailable: {0}")]
pub struct InventoryUnavailable(pub String);

pub enum InventorySource {
    Controller(ControllerClient),
    ProbeOnly,
}

impl InventorySource {
    pub fn from_config(cfg: Option<&ControllerConf>) -> Self {
        match cfg {
            Some(conf) => match ControllerClient::new(conf) {
                Ok(client) => InventorySource::Controller(client),
                Err(e) => {
                    eprintln!("[inventory] controller client init failed, probe-only mode: {e}");
                    InventorySource::ProbeOnly
                }
            },
            None => InventorySource::ProbeOnly,
        }
    }

    pub async fn fetch_hosts(&self) -> Result<Vec<InventoryHost>, InventoryUnavailable> {
        match self {
            InventorySource::Controller(client) => client.fetch_hosts().await,
            InventorySource::ProbeOnly => Err(InventoryUnavailable(
                "probe-only mode, no controller configured".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    response: TicketBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketBody {
    service_ticket: String,
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    #[serde(default)]
    response: Vec<InventoryHost>,
}

pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    auth_token: Option<String>,
}

impl ControllerClient {
    pub fn new(conf: &ControllerConf) -> anyhow::Result<Self> {
        // deadline globale par requête : expiration = InventoryUnavailable
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            username: conf.username.clone(),
            password: conf.password.clone(),
            auth_token: conf.auth_token.clone(),
        })
    }

    /// Token d'auth : soit le token fixe configuré, soit un serviceTicket
    /// obtenu par échange de credentials.
    async fn auth_token(&self) -> Result<String, InventoryUnavailable> {
        if let Some(token) = &self.auth_token {
            return Ok(token.clone());
        }
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(InventoryUnavailable(
                "no controller token or credentials configured".into(),
            ));
        };
        let resp = self
            .http
            .post(format!("{}/ticket", self.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| InventoryUnavailable(format!("ticket exchange failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(InventoryUnavailable(format!(
                "ticket exchange returned {}",
                resp.status()
            )));
        }
        let ticket: TicketResponse = resp
            .json()
            .await
            .map_err(|e| InventoryUnavailable(format!("bad ticket response: {e}")))?;
        Ok(ticket.response.service_ticket)
    }

    pub async fn fetch_hosts(&self) -> Result<Vec<InventoryHost>, InventoryUnavailable> {
        let token = self.auth_token().await?;
        let resp = self
            .http
            .get(format!("{}/host", self.base_url))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| InventoryUnavailable(format!("host query failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(InventoryUnavailable(format!(
                "host query returned {}",
                resp.status()
            )));
        }
        let hosts: HostResponse = resp
            .json()
            .await
            .map_err(|e| InventoryUnavailable(format!("bad host response: {e}")))?;
        Ok(hosts.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_only_is_always_unavailable() {
        let source = InventorySource::from_config(None);
        assert!(matches!(source, InventorySource::ProbeOnly));
        assert!(source.fetch_hosts().await.is_err());
    }

    #[tokio::test]
    async fn test_controller_without_credentials_is_unavailable() {
        let conf = ControllerConf {
            base_url: "http://localhost:58000/api/v1".into(),
            username: None,
            password: None,
            auth_token: None,
            timeout_secs: 1,
        };
        let source = InventorySource::from_config(Some(&conf));
        let err = source.fetch_hosts().await.unwrap_err();
        assert!(err.0.contains("credentials"));
    }
}
