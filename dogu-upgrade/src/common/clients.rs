use crate::common::error::{Error::K8sClientGeneration, Result};
use kube::Client;
use tokio::sync::OnceCell;

/// Thread-safe global Kubernetes REST API client container.
static KUBE_CLIENT: OnceCell<Client> = OnceCell::const_new();

pub async fn get_or_init_kube_client() -> Result<Client> {
    Ok(KUBE_CLIENT
        .get_or_try_init(|| async {
            Client::try_default()
                .await
                .map_err(|e| K8sClientGeneration { source: e })
        })
        .await?
        .clone())
}
