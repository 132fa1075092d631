// tests/property/session_test.rs

//! Property-based tests for response correlation
//! Tests that dequeue order matches wire order and that shutdown resolves everything once

use crate::common::{new_session, raw};
use bytes::Bytes;
use hsclient::core::Command;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_dequeue_order_matches_wire_order(
        batches in prop::collection::vec(1usize..=20, 1..=6)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (session, transport) = new_session();

            let producers: Vec<_> = batches
                .iter()
                .enumerate()
                .map(|(p, &count)| {
                    let session = session.clone();
                    tokio::spawn(async move {
                        for i in 0..count {
                            session.send(raw(&format!("{p}:{i}"))).await.unwrap();
                        }
                    })
                })
                .collect();
            for producer in producers {
                producer.await.unwrap();
            }

            let writes = transport.writes();
            assert_eq!(writes.len(), batches.iter().sum::<usize>());

            let mut next_per_producer = vec![0usize; batches.len()];
            for written in writes {
                let current = session.take_next_as_current().await.unwrap();
                assert_eq!(current.payload(), &written);

                // Each producer's own commands stay in the order it sent them.
                let text = String::from_utf8_lossy(&written);
                let (p, i) = text.trim_end().split_once(':').unwrap();
                let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
                assert_eq!(next_per_producer[p], i);
                next_per_producer[p] += 1;
            }
            assert_eq!(session.pending_len(), 0);
        });
    }

    #[test]
    fn test_shutdown_resolves_every_command_once(
        queued in 0usize..=30,
        taken in 0usize..=30,
        leave_current_open in any::<bool>(),
    ) {
        let taken = taken.min(queued);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (session, _transport) = new_session();
            let cmds: Vec<_> = (0..queued).map(|i| raw(&format!("cmd{i}"))).collect();
            let responses: Vec<_> = cmds.iter().map(|c| c.response().unwrap()).collect();
            for cmd in &cmds {
                session.enqueue_sent(cmd.clone());
            }

            let mut completed = 0;
            for n in 0..taken {
                let current = session.take_next_as_current().await.unwrap();
                let is_last = n + 1 == taken;
                if !(is_last && leave_current_open) {
                    assert!(current.complete(Bytes::from("0\t1")));
                    completed += 1;
                }
            }

            let failed = session.shutdown("property");
            assert_eq!(failed, queued - completed);
            assert_eq!(session.shutdown("property"), 0);

            for (cmd, response) in cmds.iter().zip(responses) {
                assert!(cmd.is_resolved());
                let outcome = response.await;
                assert!(outcome.is_ok() || outcome.unwrap_err().is_connection_closed());
            }
        });
    }
}
