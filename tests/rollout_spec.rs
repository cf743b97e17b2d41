use channel_server::models::SourceDocument;
use channel_server::rollout::{self, ClientIdentity};
use channel_server::snapshot::{Snapshot, SnapshotBuilder};
use speculate2::speculate;

fn build(yaml: &str) -> Snapshot {
    let doc = SourceDocument::parse(yaml, "stable").expect("Failed to parse document");
    SnapshotBuilder::new("stable", "v2.7.0")
        .build(vec![doc])
        .expect("Failed to build snapshot")
}

fn id(raw: &str) -> ClientIdentity {
    ClientIdentity::new(raw)
}

const K8S: &str = r#"
channels:
  - name: k8s
    latest: 1.28.0
    rollouts:
      - release: 1.29.0
        percentage: 20
  - name: pinned
    latest: 1.28.0
releases:
  - version: 1.28.0
  - version: 1.29.0
"#;

speculate! {
    before {
        let snapshot = build(K8S);
    }

    describe "bucketing" {
        it "hashes identities into 0..100" {
            for i in 0..1000 {
                assert!(rollout::bucket("k8s", &format!("cluster-{i}")) < rollout::BUCKETS);
            }
        }

        it "uses the documented FNV-1a assignment" {
            assert_eq!(rollout::bucket("k8s", "cluster-29"), 5);
            assert_eq!(rollout::bucket("k8s", "cluster-240"), 50);
            assert_eq!(rollout::bucket("k8s", "cluster-52"), 99);
        }

        it "places the same client differently per channel" {
            assert_eq!(rollout::bucket("k8s", "cluster-60"), 10);
            assert_eq!(rollout::bucket("edge", "cluster-60"), 19);
        }

        it "spreads clients roughly evenly" {
            let in_first_fifth = (0..10_000)
                .filter(|i| rollout::bucket("k8s", &format!("client-{i}")) < 20)
                .count();
            assert!((1_500..2_500).contains(&in_first_fifth), "got {in_first_fifth}");
        }
    }

    describe "resolve" {
        it "sends a client in the rollout range to the staged release" {
            // cluster-29 lands in bucket 5, inside [0, 20).
            let release = rollout::resolve(&snapshot, "k8s", &id("cluster-29")).unwrap();
            assert_eq!(release, "1.29.0");
        }

        it "sends a client outside the rollout range to the primary release" {
            // cluster-240 lands in bucket 50.
            let release = rollout::resolve(&snapshot, "k8s", &id("cluster-240")).unwrap();
            assert_eq!(release, "1.28.0");
        }

        it "treats the range upper bound as exclusive" {
            // cluster-215 lands in bucket 20, the first bucket past the rule.
            assert_eq!(rollout::bucket("k8s", "cluster-215"), 20);
            let release = rollout::resolve(&snapshot, "k8s", &id("cluster-215")).unwrap();
            assert_eq!(release, "1.28.0");
        }

        it "returns the primary release for an empty identity" {
            for raw in ["", "   "] {
                let release = rollout::resolve(&snapshot, "k8s", &id(raw)).unwrap();
                assert_eq!(release, "1.28.0");
            }
            let anonymous = rollout::resolve(&snapshot, "k8s", &ClientIdentity::anonymous()).unwrap();
            assert_eq!(anonymous, "1.28.0");
        }

        it "is stable across repeated calls" {
            for i in 0..200 {
                let identity = id(&format!("cluster-{i}"));
                let first = rollout::resolve(&snapshot, "k8s", &identity).unwrap();
                for _ in 0..5 {
                    assert_eq!(rollout::resolve(&snapshot, "k8s", &identity).unwrap(), first);
                }
            }
        }

        it "is stable across independently built snapshots" {
            let rebuilt = build(K8S);
            for i in 0..200 {
                let identity = id(&format!("cluster-{i}"));
                assert_eq!(
                    rollout::resolve(&snapshot, "k8s", &identity).unwrap(),
                    rollout::resolve(&rebuilt, "k8s", &identity).unwrap()
                );
            }
        }

        it "always returns the primary release for a channel without rollouts" {
            for i in 0..100 {
                let release = rollout::resolve(&snapshot, "pinned", &id(&format!("cluster-{i}"))).unwrap();
                assert_eq!(release, "1.28.0");
            }
        }

        it "fails with not found for an unknown channel" {
            let err = rollout::resolve(&snapshot, "nonexistent", &id("cluster-29")).unwrap_err();
            assert!(err.is_not_found());
        }
    }

    describe "multiple rules" {
        it "walks rules in order over cumulative ranges" {
            let snapshot = build(r#"
channels:
  - name: k8s
    latest: 1.28.0
    rollouts:
      - release: 1.30.0
        percentage: 8
      - release: 1.29.0
        percentage: 12
releases:
  - version: 1.28.0
  - version: 1.29.0
  - version: 1.30.0
"#);
            // Buckets 5, 10 and 50.
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-29")).unwrap(), "1.30.0");
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-60")).unwrap(), "1.29.0");
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-240")).unwrap(), "1.28.0");
        }

        it "skips zero-percent rules" {
            let snapshot = build(r#"
channels:
  - name: k8s
    latest: 1.28.0
    rollouts:
      - release: 1.30.0
        percentage: 0
      - release: 1.29.0
        percentage: 20
releases:
  - version: 1.28.0
  - version: 1.29.0
  - version: 1.30.0
"#);
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-29")).unwrap(), "1.29.0");
        }

        it "serves the primary release from an inactive rule's range" {
            let snapshot = build(r#"
channels:
  - name: k8s
    latest: 1.28.0
    rollouts:
      - release: 1.30.0
        percentage: 8
        minServerVersion: v3.0.0
      - release: 1.29.0
        percentage: 12
releases:
  - version: 1.28.0
  - version: 1.29.0
  - version: 1.30.0
"#);
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-29")).unwrap(), "1.28.0");
            assert_eq!(rollout::resolve(&snapshot, "k8s", &id("cluster-60")).unwrap(), "1.29.0");
        }

        it "assigns everyone when rules cover all 100 buckets" {
            let snapshot = build(r#"
channels:
  - name: k8s
    latest: 1.28.0
    rollouts:
      - release: 1.29.0
        percentage: 100
releases:
  - version: 1.28.0
  - version: 1.29.0
"#);
            for i in 0..100 {
                let release = rollout::resolve(&snapshot, "k8s", &id(&format!("cluster-{i}"))).unwrap();
                assert_eq!(release, "1.29.0");
            }
        }
    }
}
