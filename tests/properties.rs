//! Invariant checks across randomized decision sequences.

use proptest::prelude::*;
use serde_json::json;

use graphmill::event::{EventBus, EventKind, MemorySink};
use graphmill::executor::{ExecutionConfig, RunStatus};

mod common;
use common::{default_executor, hotel_initial};

fn drive_hotel(decisions: Vec<bool>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    rt.block_on(async move {
        let executor = default_executor();
        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());

        let mut result = executor
            .execute("hotel_o2c", hotel_initial(), ExecutionConfig::default(), &bus)
            .await
            .expect("execute");

        let mut prev_len = 0;
        let mut suspensions = 0;
        for approved in decisions {
            if result.status != RunStatus::Paused {
                break;
            }
            suspensions += 1;
            let decision = if approved { json!("approve") } else { json!("reject") };
            result = executor
                .resume(&result.thread_id, decision, ExecutionConfig::default(), &bus)
                .await
                .expect("resume");

            // Monotone progress: steps_completed never shrinks.
            assert!(result.final_state.steps_completed.len() >= prev_len);
            prev_len = result.final_state.steps_completed.len();
        }

        // At most one live suspension at any instant.
        assert!(suspensions <= 2, "hotel graph has two gates");

        // Each step name appears at most once for this acyclic graph.
        let mut seen = result.final_state.steps_completed.clone();
        seen.sort();
        let before = seen.len();
        seen.dedup();
        assert_eq!(seen.len(), before);

        if result.status != RunStatus::Paused {
            // Terminal closure: current_step is terminal, nothing pending,
            // and the last event is terminal.
            assert!(result.final_state.is_terminal());
            assert!(!result.final_state.pending_approval);
            let events = sink.snapshot();
            let last = events.last().expect("events emitted");
            assert!(matches!(
                last.kind,
                EventKind::WorkflowComplete | EventKind::WorkflowRejected
            ));
            assert_eq!(
                last.state.as_ref().expect("terminal state"),
                &result.final_state.to_value()
            );
        } else {
            // Ran out of decisions while suspended.
            assert!(result.final_state.pending_approval);
            assert_eq!(sink.snapshot().last().expect("events").kind, EventKind::WorkflowPaused);
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn hotel_run_invariants_hold_for_any_decisions(decisions in proptest::collection::vec(any::<bool>(), 0..4)) {
        drive_hotel(decisions);
    }
}
