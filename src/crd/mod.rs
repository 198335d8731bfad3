mod galera_cluster;

pub use galera_cluster::*;
