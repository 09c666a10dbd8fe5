/// Node-wide settings shared by every namespace on this machine.
#[derive(Clone, Debug, Default)]
pub struct MachineConfig {
    // A directory where namespaces keep their data and backups.
    pub data_root_dir: String,
    // Address of the cluster that log syncer learners forward to. Required for that role.
    pub remote_sync_cluster: String,
}
