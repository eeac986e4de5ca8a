//! # Integration Test Flows
//!
//! Delivery state machine over a real attestation service and chain client.
//!
//! ## Flows Tested:
//!
//! 1. **Happy path**: send on A, attest, deliver to B, receipt queued on B
//! 2. **Tampering**: payload altered after attestation is rejected by B
//! 3. **Gas retry**: out-of-gas revert retried once with more signers
//! 4. **Deadlines and cancellation**: nothing is committed on B

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use std::sync::Arc;
    use std::time::Duration;
    use xchain_messenger::{
        AttestationService, CancelToken, DeliveryContext, DeliveryOutcome, FailureReason,
        MessageId, MessageState, MessengerApi, MessengerError, Receipt, SendRequestBuilder,
    };
    use xchain_telemetry::log_message_event;

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_send_and_relay_confirms() {
        let net = TwoChains::new();
        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        log_message_event!(info, "flows", "delivered", CHAIN_B, msg.message_id);

        assert!(matches!(
            outcome,
            DeliveryOutcome::Confirmed { attempts: 1, .. }
        ));
        assert_eq!(msg.message_id, MessageId(1));
        assert!(net.b.is_delivered(CHAIN_A, msg.message_id));
        assert_eq!(
            net.b.message_state(CHAIN_A, CHAIN_B, msg.message_id),
            Some(MessageState::Delivered)
        );
        // source only learns about delivery from the receipt
        assert_eq!(
            net.a.message_state(CHAIN_A, CHAIN_B, msg.message_id),
            Some(MessageState::Attested)
        );
        assert_eq!(net.b.batcher().pending(CHAIN_A), 1);
    }

    #[tokio::test]
    async fn test_gas_limit_follows_formula() {
        let net = TwoChains::builder().num_signers(7).build();
        let (_, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        match outcome {
            DeliveryOutcome::Confirmed { gas_limit, .. } => {
                assert_eq!(gas_limit, 2_000_000 + 7 * 1_000 + REQUIRED_GAS)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redelivery_rejected() {
        let net = TwoChains::new();
        let (msg, _) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        let again = net.a_to_b.relay(&msg, &ctx()).await.unwrap();
        assert_eq!(
            again,
            DeliveryOutcome::Failed(FailureReason::DeliveryFailed(
                "message already delivered".to_string()
            ))
        );
        assert_eq!(net.b.batcher().pending(CHAIN_A), 1);
    }

    #[tokio::test]
    async fn test_allowed_executors_enforced() {
        let net = TwoChains::new();
        let req = SendRequestBuilder::new(CHAIN_B, APP)
            .required_gas_limit(REQUIRED_GAS)
            .allowed_executors(vec![[0x99; 20]])
            .build();
        let (msg, outcome) = net.a_to_b.send_and_relay(SENDER, req, &ctx()).await.unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::DeliveryFailed(
                "unauthorized executor".to_string()
            ))
        );
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
    }

    // =============================================================================
    // TAMPERING
    // =============================================================================

    #[tokio::test]
    async fn test_tampered_payload_fails_delivery() {
        let net = TwoChains::new();
        let (_, msg) = net.a.send(SENDER, request(CHAIN_B, 5)).unwrap();
        let attestation = net.attestation.request_attestation(&msg).await.unwrap();

        let mut tampered = msg.clone();
        tampered.payload[0] ^= 0xFF;
        let outcome = net
            .a_to_b
            .deliver(&tampered, &attestation, &ctx())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::DeliveryFailed(
                "invalid attestation".to_string()
            ))
        );
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
        assert_eq!(net.b.batcher().pending(CHAIN_A), 0);

        // the untouched message still goes through
        let outcome = net.a_to_b.deliver(&msg, &attestation, &ctx()).await.unwrap();
        assert!(outcome.is_confirmed());
    }

    #[tokio::test]
    async fn test_forged_receipts_fail_delivery() {
        let net = TwoChains::new();
        let (_, m1) = net.a.send(SENDER, request(CHAIN_B, 5)).unwrap();
        net.a_to_b.relay(&m1, &ctx()).await.unwrap();

        let (_, back) = net.b.send(SENDER, request(CHAIN_A, 0)).unwrap();
        let attestation = net.attestation.request_attestation(&back).await.unwrap();
        let mut forged = back.clone();
        forged.receipts = vec![Receipt::new(m1.message_id, [0x66; 20])];

        let outcome = net
            .b_to_a
            .deliver(&forged, &attestation, &ctx())
            .await
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
        assert_eq!(net.a.balance_of(&[0x66; 20], &FEE_TOKEN), 0);
    }

    // =============================================================================
    // GAS RETRY
    // =============================================================================

    #[tokio::test]
    async fn test_out_of_gas_retried_with_default_signers() {
        let net = TwoChains::builder().num_signers(5).signer_floor(8).build();
        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            DeliveryOutcome::Confirmed { attempts: 2, .. }
        ));
        assert!(net.b.is_delivered(CHAIN_A, msg.message_id));
    }

    #[tokio::test]
    async fn test_out_of_gas_retried_with_override() {
        let net = TwoChains::builder().num_signers(5).signer_floor(8).build();
        let ctx = ctx().with_signer_override(8);
        let (_, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
            .await
            .unwrap();
        match outcome {
            DeliveryOutcome::Confirmed {
                gas_limit,
                attempts,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(gas_limit, 2_000_000 + 8 * 1_000 + REQUIRED_GAS);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insufficient_override_fails_after_one_retry() {
        let net = TwoChains::builder().num_signers(5).signer_floor(8).build();
        let ctx = ctx().with_signer_override(6);
        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::DeliveryFailed("out of gas".to_string()))
        );
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
    }

    // =============================================================================
    // DEADLINES AND CANCELLATION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_attestation_timeout_leaves_message_sent() {
        let net = TwoChains::builder()
            .attestation_latency(Duration::from_secs(120))
            .build();
        let ctx = DeliveryContext::new(Duration::from_secs(2));
        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::AttestationTimeout)
        );
        assert_eq!(
            net.a.message_state(CHAIN_A, CHAIN_B, msg.message_id),
            Some(MessageState::Sent)
        );
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inclusion_deadline_fails_delivery() {
        let net = TwoChains::builder()
            .inclusion_delay(Duration::from_secs(120))
            .build();
        let ctx = DeliveryContext::new(Duration::from_secs(2));
        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::DeliveryFailed(
                "inclusion deadline elapsed".to_string()
            ))
        );
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_inclusion() {
        let net = Arc::new(
            TwoChains::builder()
                .inclusion_delay(Duration::from_secs(30))
                .build(),
        );
        let token = CancelToken::new();
        let ctx = DeliveryContext::new(Duration::from_secs(300)).with_cancel(token.clone());

        let flow = {
            let net = net.clone();
            tokio::spawn(async move {
                net.a_to_b
                    .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();

        let (msg, outcome) = flow.await.unwrap().unwrap();
        assert_eq!(outcome, DeliveryOutcome::Cancelled);
        assert!(!net.b.is_delivered(CHAIN_A, msg.message_id));
        assert_eq!(net.b.batcher().pending(CHAIN_A), 0);
    }

    #[tokio::test]
    async fn test_one_token_cancels_many_flows() {
        let net = TwoChains::new();
        let token = CancelToken::new();
        token.cancel();
        for _ in 0..3 {
            let ctx = ctx().with_cancel(token.clone());
            let (_, outcome) = net
                .a_to_b
                .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx)
                .await
                .unwrap();
            assert_eq!(outcome, DeliveryOutcome::Cancelled);
        }
        assert_eq!(net.b.batcher().pending(CHAIN_A), 0);
    }

    // =============================================================================
    // CALLER ERRORS
    // =============================================================================

    #[tokio::test]
    async fn test_send_to_self_is_error() {
        let net = TwoChains::new();
        let result = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_A, 5), &ctx())
            .await;
        assert_eq!(result.unwrap_err(), MessengerError::InvalidDestination(CHAIN_A));
    }

    #[tokio::test]
    async fn test_negative_fee_is_error() {
        let net = TwoChains::new();
        let result = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, -5), &ctx())
            .await;
        assert_eq!(result.unwrap_err(), MessengerError::NegativeAmount(-5));
    }
}
