//! Cluster session state shared between the controller and the watcher.

/// Identity of the cluster currently held, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterSession {
    /// Identifier reported when the cluster was created.
    pub cluster_id: Option<String>,
    /// Master node address reported once the cluster is reachable.
    pub master_address: Option<String>,
}

impl ClusterSession {
    /// Returns the identity once both the identifier and master address
    /// are known.
    #[must_use]
    pub fn identity(&self) -> Option<ClusterIdentity> {
        let cluster_id = self.cluster_id.clone()?;
        let master_address = self.master_address.clone()?;
        Some(ClusterIdentity {
            cluster_id,
            master_address,
        })
    }

    /// Forgets the cluster.
    pub fn clear(&mut self) {
        self.cluster_id = None;
        self.master_address = None;
    }
}

/// A fully provisioned cluster, handed to the task engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterIdentity {
    /// Identifier reported by the provisioning tool.
    pub cluster_id: String,
    /// Address of the master node.
    pub master_address: String,
}

/// Point-in-time view of the controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Identifier of the held cluster.
    pub cluster_id: Option<String>,
    /// Address of the master node.
    pub master_address: Option<String>,
    /// Whether a lifecycle transition is in flight.
    pub locked: bool,
}
