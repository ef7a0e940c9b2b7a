use crate::common::error::{
    Error::{GetNamespace, InvalidDoguName, RegexCompile},
    Result,
};
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use regex::Regex;

/// Dogu resources are named after the simple dogu name, which has to be a DNS-1123 label.
pub fn validate_dogu_name(name: &str) -> Result<()> {
    let regex: &str = r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$";
    if !Regex::new(regex)
        .map_err(|e| RegexCompile {
            source: e,
            expression: regex.to_string(),
        })?
        .is_match(name)
    {
        return Err(InvalidDoguName {
            name: name.to_string(),
        });
    }

    Ok(())
}

/// Fails unless the Namespace exists.
pub async fn validate_namespace(client: Client, namespace: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client);
    namespaces.get(namespace).await.map_err(|e| GetNamespace {
        source: e,
        namespace: namespace.to_string(),
    })?;

    Ok(())
}
