// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! File backed collaborators: a [`PodResourcesClient`] reading pod resources
//! snapshots from JSON / YAML text files, and a [`Registrar`] leaving
//! registration requests in a directory for the kubelet front end.

use crate::deviceplugin::{RegisterRequest, Registrar, RegistrationError};
use crate::podresources::{ListPodResourcesResponse, PodResources, PodResourcesClient, PodResourcesError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

fn parse(path: &Path, text: &str) -> Result<ListPodResourcesResponse, PodResourcesError> {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml_ng::from_str(text).map_err(|e| {
                PodResourcesError::Malformed(format!(
                    "Failed to deserialize pod resources from YAML file ({}): {e}",
                    path.display()
                ))
            })
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(text).map_err(|e| {
            PodResourcesError::Malformed(format!(
                "Failed to deserialize pod resources from JSON file ({}): {e}",
                path.display()
            ))
        }),
        Some(ext) => Err(PodResourcesError::Malformed(format!(
            "Unsupported file extension {}",
            ext.display()
        ))),
        None => Err(PodResourcesError::Malformed("Missing file extension".to_string())),
    }
}

/// Pod resources read from a file on every call, e.g. a snapshot dumped by a
/// node agent.
#[derive(Clone, Debug)]
pub struct FilePodResources {
    path: PathBuf,
}

impl FilePodResources {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PodResourcesClient for FilePodResources {
    async fn list(&self) -> Result<Vec<PodResources>, PodResourcesError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let response = parse(&self.path, &text)?;
        debug!(
            "Read {} pods from {}",
            response.pod_resources.len(),
            self.path.display()
        );
        Ok(response.pod_resources)
    }
}

/// A [`Registrar`] writing every request as `<endpoint>.json` into a directory
#[derive(Clone, Debug)]
pub struct FileRegistrar {
    dir: PathBuf,
}

impl FileRegistrar {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Registrar for FileRegistrar {
    async fn register(&self, request: RegisterRequest) -> Result<(), RegistrationError> {
        if request.endpoint.is_empty() || request.endpoint.contains('/') {
            return Err(RegistrationError::Rejected {
                resource: request.resource_name,
                reason: format!("invalid endpoint {:?}", request.endpoint),
            });
        }
        let json = serde_json::to_string_pretty(&request).map_err(std::io::Error::other)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", request.endpoint));
        tokio::fs::write(&path, json).await?;
        debug!(
            "Registration of {} written to {}",
            request.resource_name,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = "
podResources:
  - name: pod-a
    namespace: default
    containers:
      - name: app
        devices:
          - resourceName: afxdp/cdq
            deviceIds: [ens1f0sf1, ens1f0sf2]
  - name: pod-b
";

    #[tokio::test]
    async fn snapshot_is_read_on_every_call() {
        let dir = std::env::temp_dir().join(format!("afxdp-podres-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("pods.yaml");
        tokio::fs::write(&path, YAML).await.unwrap();

        let client = FilePodResources::new(&path);
        let pods = client.list().await.unwrap();
        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].name, "pod-a");
        assert_eq!(
            pods[0].containers[0].devices[0].device_ids,
            vec!["ens1f0sf1", "ens1f0sf2"]
        );
        assert!(pods[1].containers.is_empty());

        tokio::fs::write(&path, "podResources: []\n").await.unwrap();
        assert!(client.list().await.unwrap().is_empty());

        tokio::fs::write(&path, "podResources: 12\n").await.unwrap();
        assert!(matches!(
            client.list().await,
            Err(PodResourcesError::Malformed(_))
        ));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
        assert!(matches!(
            client.list().await,
            Err(PodResourcesError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn json_snapshot() {
        let dir = std::env::temp_dir().join(format!("afxdp-podres-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("pods.json");
        tokio::fs::write(
            &path,
            r#"{"podResources": [{"name": "pod-a", "containers": [{"name": "c"}]}]}"#,
        )
        .await
        .unwrap();
        let pods = FilePodResources::new(&path).list().await.unwrap();
        assert_eq!(pods[0].containers[0].name, "c");

        let txt = dir.join("pods.txt");
        tokio::fs::write(&txt, "{}").await.unwrap();
        assert!(matches!(
            FilePodResources::new(&txt).list().await,
            Err(PodResourcesError::Malformed(_))
        ));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn registrations_land_in_the_directory() {
        let dir = std::env::temp_dir().join(format!("afxdp-reg-{}", uuid::Uuid::new_v4()));
        let registrar = FileRegistrar::new(&dir);
        let request = RegisterRequest::new("afxdp-pool1.sock", "afxdp/pool1");
        registrar.register(request.clone()).await.unwrap();

        let text = tokio::fs::read_to_string(dir.join("afxdp-pool1.sock.json"))
            .await
            .unwrap();
        let written: RegisterRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(written, request);
        assert!(text.contains("\"resourceName\": \"afxdp/pool1\""));

        let err = registrar
            .register(RegisterRequest::new("../escape.sock", "afxdp/pool1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Rejected { .. }));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
