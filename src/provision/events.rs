//! Classifies provisioning tool output lines into lifecycle events.
//!
//! Patterns are checked in a fixed order and the first matching pattern
//! decides the outcome, even when it yields no event (for example a creation
//! line with a blank identifier).

const CLUSTER_ID_OPEN: &str = "Cluster (ID: ";
const CREATED_CLOSE: &str = ") successfully created!";
const MASTER_MARKER: &str = "export BIBIGRID_MASTER=";
const ABORTED: &str = "Aborting operation. No instances started/terminated.";
const TERMINATED_CLOSE: &str = ") successfully terminated";
const NOT_FOUND_OPEN: &str = "No suitable bibigrid cluster with ID: [";
const NOT_FOUND_CLOSE: &str = "] found.";

/// A recognised provisioning milestone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The tool created a cluster with this identifier.
    ClusterCreated {
        /// Identifier assigned by the tool.
        id: String,
    },
    /// The master node is reachable at this address.
    MasterReady {
        /// Host name or IP address of the master.
        address: String,
    },
    /// Provisioning gave up before starting any instance.
    ProvisionAborted,
    /// The cluster was torn down.
    ClusterTerminated,
    /// The tool could not find the cluster it was asked to terminate.
    ClusterNotFound,
}

impl LifecycleEvent {
    /// Returns `true` for events after which no cluster is held.
    #[must_use]
    pub const fn ends_cluster(&self) -> bool {
        matches!(
            self,
            Self::ProvisionAborted | Self::ClusterTerminated | Self::ClusterNotFound
        )
    }
}

/// Maps one output line to at most one event.
#[must_use]
pub fn classify_line(line: &str) -> Option<LifecycleEvent> {
    if line.contains(CLUSTER_ID_OPEN) && line.contains(CREATED_CLOSE) {
        return between(line, CLUSTER_ID_OPEN, CREATED_CLOSE).map(|id| {
            LifecycleEvent::ClusterCreated { id: id.to_owned() }
        });
    }
    if let Some((_, tail)) = line.rsplit_once(MASTER_MARKER) {
        let address = tail.trim();
        return (!address.is_empty()).then(|| LifecycleEvent::MasterReady {
            address: address.to_owned(),
        });
    }
    if line.contains(ABORTED) {
        return Some(LifecycleEvent::ProvisionAborted);
    }
    if line.contains(TERMINATED_CLOSE) && line.contains(CLUSTER_ID_OPEN) {
        return Some(LifecycleEvent::ClusterTerminated);
    }
    if line.contains(NOT_FOUND_OPEN) && line.contains(NOT_FOUND_CLOSE) {
        return Some(LifecycleEvent::ClusterNotFound);
    }
    None
}

/// Text between the first `open` marker and the next `close` after it.
fn between<'a>(line: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let (_, rest) = line.split_once(open)?;
    let (inner, _) = rest.split_once(close)?;
    let trimmed = inner.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    //! Unit tests for line classification.

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::created(
        "Cluster (ID: abc123) successfully created!",
        Some(LifecycleEvent::ClusterCreated { id: "abc123".to_owned() })
    )]
    #[case::created_with_prefix(
        "[main] INFO  Cluster (ID: q7) successfully created!",
        Some(LifecycleEvent::ClusterCreated { id: "q7".to_owned() })
    )]
    #[case::master(
        "export BIBIGRID_MASTER=10.0.0.5",
        Some(LifecycleEvent::MasterReady { address: "10.0.0.5".to_owned() })
    )]
    #[case::master_trailing_space(
        "  export BIBIGRID_MASTER=10.0.0.5   ",
        Some(LifecycleEvent::MasterReady { address: "10.0.0.5".to_owned() })
    )]
    #[case::aborted(
        "Aborting operation. No instances started/terminated.",
        Some(LifecycleEvent::ProvisionAborted)
    )]
    #[case::terminated(
        "Cluster (ID: abc123) successfully terminated",
        Some(LifecycleEvent::ClusterTerminated)
    )]
    #[case::not_found(
        "No suitable bibigrid cluster with ID: [abc123] found.",
        Some(LifecycleEvent::ClusterNotFound)
    )]
    #[case::unrelated("Waiting for instances to boot...", None)]
    fn classify_recognises_tool_milestones(
        #[case] line: &str,
        #[case] expected: Option<LifecycleEvent>,
    ) {
        assert_eq!(classify_line(line), expected);
    }

    #[rstest]
    fn blank_created_identifier_yields_no_event() {
        assert_eq!(
            classify_line("Cluster (ID: ) successfully created! Aborting operation. No instances started/terminated."),
            None
        );
    }

    #[rstest]
    fn blank_master_address_yields_no_event() {
        assert_eq!(classify_line("export BIBIGRID_MASTER=   "), None);
    }

    #[rstest]
    fn master_address_uses_last_marker() {
        assert_eq!(
            classify_line("export BIBIGRID_MASTER=old export BIBIGRID_MASTER=10.1.1.1"),
            Some(LifecycleEvent::MasterReady {
                address: "10.1.1.1".to_owned()
            })
        );
    }

    #[rstest]
    fn terminal_events_end_the_cluster() {
        assert!(LifecycleEvent::ClusterNotFound.ends_cluster());
        assert!(!LifecycleEvent::ClusterCreated { id: "x".to_owned() }.ends_cluster());
    }
}
