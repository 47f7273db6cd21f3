//! Unit tests for valkey-slot-reconciler.
//!
//! These tests run without a store or Kubernetes cluster and test individual
//! components in isolation.

mod crd_tests {
    use kube::CustomResourceExt;
    use valkey_slot_reconciler::controller::membership::ReadyNode;
    use valkey_slot_reconciler::crd::{ClusterStatus, ClusterTopology, RedisCluster};

    #[test]
    fn test_status_default() {
        assert_eq!(ClusterStatus::default(), ClusterStatus::Ready);
    }

    #[test]
    fn test_crd_metadata() {
        let crd = RedisCluster::crd();
        assert_eq!(crd.spec.group, "cache.valkey.io");
        assert_eq!(crd.spec.names.kind, "RedisCluster");
        assert_eq!(crd.spec.names.plural, "redisclusters");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_record_nodes_replaces_previous() {
        let mut topology = ClusterTopology::default();
        topology.record_nodes(&[
            ReadyNode::new("a", "cache-0", "10.0.0.1"),
            ReadyNode::new("b", "cache-1", "10.0.0.2"),
        ]);
        topology.record_nodes(&[ReadyNode::new("a", "cache-0", "10.0.0.1")]);
        assert_eq!(topology.observed_ready(), 1);
        assert_eq!(topology.nodes[0].node_id, "a");
    }
}

mod slot_tests {
    use valkey_slot_reconciler::slots::{SlotRange, TOTAL_SLOTS, plan_slot_ranges, range_index_of};

    #[test]
    fn test_three_node_plan() {
        assert_eq!(
            plan_slot_ranges(3).unwrap(),
            vec![
                SlotRange::new(0, 5460),
                SlotRange::new(5461, 10922),
                SlotRange::new(10923, 16383),
            ]
        );
    }

    #[test]
    fn test_four_node_plan() {
        assert_eq!(
            plan_slot_ranges(4).unwrap(),
            vec![
                SlotRange::new(0, 4095),
                SlotRange::new(4096, 8191),
                SlotRange::new(8192, 12287),
                SlotRange::new(12288, 16383),
            ]
        );
    }

    #[test]
    fn test_single_node_owns_everything() {
        let plan = plan_slot_ranges(1).unwrap();
        assert_eq!(plan, vec![SlotRange::new(0, TOTAL_SLOTS - 1)]);
    }

    #[test]
    fn test_zero_nodes_rejected() {
        assert!(plan_slot_ranges(0).is_err());
    }

    #[test]
    fn test_range_index_of() {
        let plan = plan_slot_ranges(3).unwrap();
        assert_eq!(range_index_of(&plan, 0), Some(0));
        assert_eq!(range_index_of(&plan, 5461), Some(1));
        assert_eq!(range_index_of(&plan, 16383), Some(2));
    }

    #[test]
    fn test_slot_range_display() {
        assert_eq!(SlotRange::new(0, 5460).to_string(), "0-5460");
        assert_eq!(SlotRange::single(7).to_string(), "7");
    }
}

mod client_tests {
    use std::time::Duration;

    use valkey_slot_reconciler::client::valkey_client::{migrate_args, setslot_args};
    use valkey_slot_reconciler::client::{MigrateTarget, ParsedClusterNodes, SetSlotState};
    use valkey_slot_reconciler::slots::SlotRange;

    #[test]
    fn test_parse_cluster_nodes_ownership() {
        let output = "\
aaa 10.0.0.2:6379@16379 master - 0 0 2 connected 5461-10922
bbb 10.0.0.1:6379@16379 myself,master - 0 0 1 connected 0-5460
ccc 10.0.0.4:6379@16379 slave bbb 0 0 1 connected
";
        let parsed = ParsedClusterNodes::parse(output).unwrap();
        assert_eq!(parsed.masters().len(), 2);
        assert_eq!(parsed.myself().unwrap().node_id, "bbb");

        let ownership = parsed.slot_ownership();
        assert_eq!(ownership.len(), 2);
        assert_eq!(ownership[0].owner, "bbb");
        assert_eq!(ownership[0].range, SlotRange::new(0, 5460));
        assert_eq!(ownership[1].owner, "aaa");
    }

    #[test]
    fn test_migrate_args_with_auth() {
        let target = MigrateTarget {
            host: "10.0.0.3".to_string(),
            port: 6379,
            timeout: Duration::from_secs(1),
            password: Some("secret".to_string()),
        };
        assert_eq!(
            migrate_args(&target, "user:1"),
            vec!["10.0.0.3", "6379", "user:1", "0", "1000", "AUTH", "secret"]
        );
    }

    #[test]
    fn test_setslot_args() {
        assert_eq!(
            setslot_args(42, &SetSlotState::Importing("src".to_string())),
            vec!["SETSLOT", "42", "IMPORTING", "src"]
        );
    }
}

mod controller_tests {
    use valkey_slot_reconciler::client::ValkeyError;
    use valkey_slot_reconciler::controller::membership::{
        ReadyNode, nodes_by_sequence, sequence_from_name_suffix,
    };
    use valkey_slot_reconciler::controller::{Error, ReconcilerConfig, WorkRouting};

    fn node(i: usize) -> ReadyNode {
        ReadyNode::new(format!("id-{}", i), format!("cache-{}", i), format!("10.0.0.{}", i))
    }

    #[test]
    fn test_sequence_out_of_range_is_race() {
        let nodes = vec![node(0), node(5)];
        let err = nodes_by_sequence(&nodes, sequence_from_name_suffix).unwrap_err();
        assert!(matches!(err, Error::Race(_)));
    }

    #[test]
    fn test_custom_sequence_mapping() {
        let nodes = vec![node(1), node(0)];
        // Reverse the natural order.
        let sorted =
            nodes_by_sequence(&nodes, |name| sequence_from_name_suffix(name).map(|i| 1 - i))
                .unwrap();
        assert_eq!(sorted[0].name, "cache-1");
        assert_eq!(sorted[1].name, "cache-0");
    }

    #[test]
    fn test_config_builder() {
        let config = ReconcilerConfig::default()
            .with_concurrent_migrations(8)
            .with_routing(WorkRouting::RoundRobin);
        assert_eq!(config.concurrent_migrations, 8);
        assert_eq!(config.routing, WorkRouting::RoundRobin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Protocol(ValkeyError::Connection("refused".into())).is_retryable());
        assert!(Error::Worker("panicked".into()).is_retryable());
        assert!(!Error::Configuration("bad".into()).is_retryable());
    }
}

mod metrics_tests {
    use valkey_slot_reconciler::Metrics;
    use valkey_slot_reconciler::crd::ClusterStatus;

    #[test]
    fn test_status_gauge_encoded() {
        let metrics = Metrics::new();
        metrics.set_status(ClusterStatus::ScalingUp);
        let text = metrics.encode();
        assert!(text.contains(r#"slot_reconciler_cluster_status{status="ScalingUp"} 1"#));
        assert!(text.contains(r#"slot_reconciler_cluster_status{status="Ready"} 0"#));
    }
}
