// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Checks that a pod really owns the devices of a server.

use k8s_intf::{PodResourcesClient, PodResourcesError};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Tell if pod `pod_name` has a container holding exactly `devices` of `resource_name`.
///
/// The pod resources are queried on every call. Errors of the query are
/// returned and must be treated as a failed validation.
pub async fn validate_pod(
    client: &dyn PodResourcesClient,
    pod_name: &str,
    resource_name: &str,
    devices: &BTreeSet<&str>,
) -> Result<bool, PodResourcesError> {
    let pods = client.list().await?;
    let mut found = false;
    for pod in pods.iter().filter(|pod| pod.name == pod_name) {
        found = true;
        for container in &pod.containers {
            let ids: Vec<&str> = container.device_ids(resource_name).collect();
            let unique: BTreeSet<&str> = ids.iter().copied().collect();
            if unique.len() == ids.len() && &unique == devices {
                debug!(
                    "Pod {pod_name}: container {} holds devices {ids:?}",
                    container.name
                );
                return Ok(true);
            }
        }
    }
    if found {
        warn!("Pod {pod_name}: no container holds exactly {devices:?} of {resource_name}");
    } else {
        warn!("Pod {pod_name}: not found on node");
    }
    Ok(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_intf::podresources::{ContainerDevices, ContainerResources, PodResources};
    use k8s_intf::testing::{FakePodResources, pod};

    const RESOURCE: &str = "afxdp/cdq";

    fn set<'a>(devices: &[&'a str]) -> BTreeSet<&'a str> {
        devices.iter().copied().collect()
    }

    async fn check(pods: Vec<PodResources>, devices: &[&str]) -> bool {
        let client = FakePodResources::new(pods);
        validate_pod(&client, "pod-a", RESOURCE, &set(devices))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_set_is_required() {
        let pods = || vec![pod("pod-a", RESOURCE, &["sf1", "sf2"])];
        assert!(check(pods(), &["sf1", "sf2"]).await);
        assert!(check(pods(), &["sf2", "sf1"]).await);
        // missing, extra, substituted
        assert!(!check(pods(), &["sf1"]).await);
        assert!(!check(pods(), &["sf1", "sf2", "sf3"]).await);
        assert!(!check(pods(), &["sf1", "sf3"]).await);
    }

    #[tokio::test]
    async fn duplicates_do_not_count() {
        let pods = vec![pod("pod-a", RESOURCE, &["sf1", "sf1"])];
        assert!(!check(pods, &["sf1"]).await);
    }

    #[tokio::test]
    async fn other_pods_and_resources_are_ignored() {
        let pods = vec![
            pod("pod-b", RESOURCE, &["sf1"]),
            pod("pod-a", "afxdp/other", &["sf1"]),
        ];
        assert!(!check(pods, &["sf1"]).await);
        assert!(!check(vec![], &["sf1"]).await);
    }

    #[tokio::test]
    async fn any_container_may_match() {
        let mut owner = pod("pod-a", RESOURCE, &["sf9"]);
        owner.containers.push(ContainerResources {
            name: "second".to_owned(),
            devices: vec![
                ContainerDevices {
                    resource_name: "example.com/gpu".to_owned(),
                    device_ids: vec!["gpu0".to_owned()],
                },
                ContainerDevices {
                    resource_name: RESOURCE.to_owned(),
                    device_ids: vec!["sf1".to_owned()],
                },
            ],
        });
        assert!(check(vec![owner], &["sf1"]).await);
    }

    #[tokio::test]
    async fn errors_are_propagated() {
        let client = FakePodResources::new(vec![pod("pod-a", RESOURCE, &["sf1"])]);
        client.fail();
        assert!(
            validate_pod(&client, "pod-a", RESOURCE, &set(&["sf1"]))
                .await
                .is_err()
        );
    }
}
