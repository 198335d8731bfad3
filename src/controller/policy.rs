//! Per-account policy for system credential reconciliation
//!
//! Every system account the operator manages is described here: which hosts
//! it may log in from, whether ProxySQL also carries it, and which components
//! must be restarted or resynchronized when its password changes.

use crate::crd::GaleraCluster;

/// The system accounts managed by the operator.
///
/// Modeled as an enum rather than raw account-name strings so that the
/// restart/resync rules below cannot silently diverge from the account list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemAccount {
    /// Database superuser
    Root,
    /// Backup agent (xtrabackup)
    Backup,
    /// Monitoring agent used by ProxySQL and PMM
    Monitor,
    /// Liveness/readiness check agent
    HealthCheck,
    /// Privileged account the operator itself uses
    Operator,
    /// PMM metrics agent API credential (present only when metrics enabled)
    MetricsAgent,
    /// ProxySQL admin interface credential (present only when proxy enabled)
    ProxyAdmin,
}

impl SystemAccount {
    /// The account name as it appears in the credential Secret and the database
    pub fn name(self) -> &'static str {
        match self {
            SystemAccount::Root => "root",
            SystemAccount::Backup => "xtrabackup",
            SystemAccount::Monitor => "monitor",
            SystemAccount::HealthCheck => "clustercheck",
            SystemAccount::Operator => "operator",
            SystemAccount::MetricsAgent => "pmmserver",
            SystemAccount::ProxyAdmin => "proxyadmin",
        }
    }
}

/// Cluster feature flags the policy table depends on.
///
/// Passed in explicitly per pass so the policy stays free of ambient state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// PMM metrics agent enabled
    pub metrics: bool,
    /// ProxySQL layer enabled
    pub proxy: bool,
}

impl Features {
    pub fn from_cluster(cluster: &GaleraCluster) -> Self {
        Self {
            metrics: cluster.metrics_enabled(),
            proxy: cluster.proxy_enabled(),
        }
    }
}

/// Side effects a password change imposes on running components.
///
/// Folded across all changed accounts into a single accumulator; see
/// [`Obligations::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Obligations {
    /// The database tier must be restarted
    pub restart_database: bool,
    /// The proxy tier must be restarted
    pub restart_proxy: bool,
    /// ProxySQL must resync its user table from the live database grants
    pub sync_proxy_users: bool,
}

impl Obligations {
    /// Combine the obligations of two accounts. Commutative and associative,
    /// with `Obligations::default()` as the identity.
    pub fn merge(self, other: Self) -> Self {
        Self {
            restart_database: self.restart_database || other.restart_database,
            restart_proxy: self.restart_proxy || other.restart_proxy,
            sync_proxy_users: self.sync_proxy_users || other.sync_proxy_users,
        }
    }
}

/// Policy entry for one system account
#[derive(Debug, Clone, Copy)]
pub struct AccountPolicy {
    pub account: SystemAccount,
    /// Hosts the account may log in from. Empty means the account has no
    /// database login at all (API- or admin-interface-level credential only).
    pub hosts: &'static [&'static str],
    /// Whether ProxySQL carries this account in its own user table
    pub proxy_managed: bool,
}

impl AccountPolicy {
    /// Restart/resync obligations triggered when this account's value changes
    pub fn obligations(&self, features: Features) -> Obligations {
        match self.account {
            SystemAccount::Root => Obligations {
                sync_proxy_users: true,
                ..Obligations::default()
            },
            SystemAccount::Backup => Obligations {
                restart_database: true,
                ..Obligations::default()
            },
            SystemAccount::Monitor => Obligations {
                restart_proxy: true,
                // PMM authenticates its database queries as monitor
                restart_database: features.metrics,
                ..Obligations::default()
            },
            SystemAccount::HealthCheck => Obligations {
                restart_database: true,
                ..Obligations::default()
            },
            SystemAccount::Operator => Obligations {
                restart_proxy: true,
                ..Obligations::default()
            },
            SystemAccount::MetricsAgent => {
                if features.metrics {
                    Obligations {
                        restart_database: true,
                        restart_proxy: true,
                        ..Obligations::default()
                    }
                } else {
                    Obligations::default()
                }
            }
            SystemAccount::ProxyAdmin => Obligations {
                restart_proxy: true,
                ..Obligations::default()
            },
        }
    }
}

/// The full policy table for one reconciliation pass.
///
/// Built per pass because the metrics-agent and proxy-admin entries exist
/// only when the corresponding feature is enabled.
#[derive(Debug)]
pub struct PolicyTable {
    features: Features,
    entries: Vec<AccountPolicy>,
}

impl PolicyTable {
    pub fn new(features: Features) -> Self {
        let mut entries = vec![
            AccountPolicy {
                account: SystemAccount::Root,
                hosts: &["localhost", "%"],
                proxy_managed: false,
            },
            AccountPolicy {
                account: SystemAccount::Backup,
                hosts: &["localhost"],
                proxy_managed: false,
            },
            AccountPolicy {
                account: SystemAccount::Monitor,
                hosts: &["%"],
                proxy_managed: true,
            },
            AccountPolicy {
                account: SystemAccount::HealthCheck,
                hosts: &["localhost"],
                proxy_managed: false,
            },
            AccountPolicy {
                account: SystemAccount::Operator,
                hosts: &["%"],
                proxy_managed: false,
            },
        ];
        if features.metrics {
            entries.push(AccountPolicy {
                account: SystemAccount::MetricsAgent,
                hosts: &[],
                proxy_managed: false,
            });
        }
        if features.proxy {
            entries.push(AccountPolicy {
                account: SystemAccount::ProxyAdmin,
                hosts: &[],
                proxy_managed: true,
            });
        }
        Self { features, entries }
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn accounts(&self) -> &[AccountPolicy] {
        &self.entries
    }
}
