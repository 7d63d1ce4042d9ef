//! In-node commands run while provisioning a cluster.

/// Admin kubeconfig written by `kubeadm init` inside the node.
pub const ADMIN_CONF: &str = "/etc/kubernetes/admin.conf";

/// CNI manifest shipped with the node image.
pub const CNI_MANIFEST: &str = "/kind/manifests/default-cni.yaml";

/// Placeholder for the pod network in [`CNI_MANIFEST`].
pub const POD_SUBNET_PLACEHOLDER: &str = "{{ .PodSubnet }}";

/// One setup command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStep {
    pub description: &'static str,
    pub argv: Vec<String>,
    /// A non-zero exit is logged and ignored.
    pub allow_failure: bool,
}

impl SetupStep {
    fn new(description: &'static str, argv: &[&str]) -> Self {
        Self {
            description,
            argv: argv.iter().map(|s| s.to_string()).collect(),
            allow_failure: false,
        }
    }

    fn best_effort(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

/// Setup commands in execution order.
pub fn setup_steps(pod_cidr: &str) -> Vec<SetupStep> {
    let init_cidr = format!("--pod-network-cidr={pod_cidr}");
    let apply_cni = format!(
        "sed 's|{POD_SUBNET_PLACEHOLDER}|{pod_cidr}|g' {CNI_MANIFEST} | kubectl apply -f -"
    );

    vec![
        SetupStep::new(
            "Enabling IPv4 forwarding",
            &["sysctl", "-w", "net.ipv4.ip_forward=1"],
        ),
        SetupStep::new(
            "Initializing control plane",
            &[
                "kubeadm",
                "init",
                init_cidr.as_str(),
                "--apiserver-cert-extra-sans=127.0.0.1",
            ],
        ),
        SetupStep::new("Installing CNI", &["sh", "-c", apply_cni.as_str()]),
        SetupStep::new(
            "Removing control-plane taint",
            &[
                "kubectl",
                "taint",
                "nodes",
                "--all",
                "node-role.kubernetes.io/control-plane-",
            ],
        )
        .best_effort(),
    ]
}

/// Prints the admin kubeconfig to stdout.
pub fn read_admin_conf() -> Vec<String> {
    vec!["cat".to_string(), ADMIN_CONF.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered_and_only_taint_may_fail() {
        let steps = setup_steps("10.10.0.0/16");
        let programs: Vec<_> = steps.iter().map(|s| s.argv[0].as_str()).collect();
        assert_eq!(programs, ["sysctl", "kubeadm", "sh", "kubectl"]);

        let tolerant: Vec<_> = steps.iter().map(|s| s.allow_failure).collect();
        assert_eq!(tolerant, [false, false, false, true]);
    }

    #[test]
    fn test_pod_cidr_is_substituted() {
        let steps = setup_steps("10.10.0.0/16");
        assert!(steps[1]
            .argv
            .contains(&"--pod-network-cidr=10.10.0.0/16".to_string()));
        assert_eq!(
            steps[2].argv[2],
            "sed 's|{{ .PodSubnet }}|10.10.0.0/16|g' /kind/manifests/default-cni.yaml | kubectl apply -f -"
        );
    }
}
