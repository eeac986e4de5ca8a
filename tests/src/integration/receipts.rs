//! # Receipt Flows
//!
//! Receipts travel back to the origin either piggybacked on regular
//! messages or in receipt-only messages, and credit the delivering relayer
//! exactly once.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use std::sync::Arc;
    use xchain_messenger::{
        Amount, FeeInfo, MessageId, MessageState, Messenger, MessengerApi, MessengerConfig, MessengerError,
        MessengerSnapshot, MockReceiver, Receipt,
    };
    use xchain_telemetry::log_event;

    /// Send `n` messages A -> B with `fee` each and deliver them all.
    async fn deliver_to_b(net: &TwoChains, n: usize, fee: i128) -> Vec<MessageId> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            let (msg, outcome) = net
                .a_to_b
                .send_and_relay(SENDER, request(CHAIN_B, fee), &ctx())
                .await
                .unwrap();
            assert!(outcome.is_confirmed());
            ids.push(msg.message_id);
        }
        ids
    }

    #[tokio::test]
    async fn test_specified_receipts_then_regular_message() {
        let net = TwoChains::new();
        let ids = deliver_to_b(&net, 2, 5).await;
        assert_eq!(ids, vec![MessageId(1), MessageId(2)]);
        assert_eq!(net.b.batcher().pending(CHAIN_A), 2);

        // receipt-only message for both deliveries
        let (_, receipt_msg) = net
            .b
            .send_specified_receipts(SENDER, CHAIN_A, &ids, FeeInfo::zero(FEE_TOKEN), vec![])
            .unwrap();
        let outcome = net.b_to_a.relay(&receipt_msg, &ctx()).await.unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 10);
        log_event!(info, "receipts", "specified receipts credited", balance = 10);

        // the regular queue was not drained, so the next message carries them again
        assert_eq!(net.b.batcher().pending(CHAIN_A), 2);
        let (regular, outcome) = net
            .b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(regular.receipts.len(), 2);
        assert_eq!(regular.receipts[0], Receipt::new(MessageId(1), RELAYER_AB));
        assert_eq!(regular.receipts[1], Receipt::new(MessageId(2), RELAYER_AB));

        // and they do not pay twice
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 10);
        for id in ids {
            assert!(net.a.batcher().is_credited(CHAIN_B, id));
            assert_eq!(
                net.a.message_state(CHAIN_A, CHAIN_B, id),
                Some(MessageState::Delivered)
            );
        }
    }

    #[tokio::test]
    async fn test_receipts_batched_five_at_a_time() {
        let net = TwoChains::new();
        deliver_to_b(&net, 7, 1).await;

        let (first, _) = net
            .b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();
        assert_eq!(first.receipts.len(), 5);
        let ids: Vec<u64> = first.receipts.iter().map(|r| r.received_message_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 5);

        let (second, _) = net
            .b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();
        assert_eq!(second.receipts.len(), 2);
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 7);
    }

    #[tokio::test]
    async fn test_receipts_flow_both_ways() {
        let net = TwoChains::new();
        deliver_to_b(&net, 1, 4).await;

        // B -> A carries the receipt for A's message and pays RELAYER_AB
        let (_, outcome) = net
            .b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 6), &ctx())
            .await
            .unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 4);

        // A -> B carries the receipt for B's message and pays RELAYER_BA
        let (back, _) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 0), &ctx())
            .await
            .unwrap();
        assert_eq!(back.receipts, vec![Receipt::new(MessageId(1), RELAYER_BA)]);
        assert_eq!(net.b.balance_of(&RELAYER_BA, &FEE_TOKEN), 6);
    }

    #[tokio::test]
    async fn test_overflowing_receipt_does_not_block_delivery() {
        let net = TwoChains::new();
        let (m1, _) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 1), &ctx())
            .await
            .unwrap();
        let (m2, _) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, Amount::MAX), &ctx())
            .await
            .unwrap();

        let (back, outcome) = net
            .b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(back.receipts.len(), 2);
        assert!(net.a.is_delivered(CHAIN_B, back.message_id));

        // the first receipt pays, the overflowing one stays open
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 1);
        assert!(net.a.batcher().is_credited(CHAIN_B, m1.message_id));
        assert!(!net.a.batcher().is_credited(CHAIN_B, m2.message_id));
        assert_eq!(
            net.a.message_state(CHAIN_A, CHAIN_B, m2.message_id),
            Some(MessageState::Attested)
        );
    }

    #[tokio::test]
    async fn test_specified_receipts_for_unknown_message() {
        let net = TwoChains::new();
        let result =
            net.b
                .send_specified_receipts(SENDER, CHAIN_A, &[MessageId(9)], FeeInfo::zero(FEE_TOKEN), vec![]);
        assert_eq!(
            result.unwrap_err(),
            MessengerError::UnknownMessage {
                chain: CHAIN_A,
                message_id: MessageId(9)
            }
        );
    }

    #[tokio::test]
    async fn test_add_fee_amount_raises_reward() {
        let net = TwoChains::new();
        let ids = deliver_to_b(&net, 1, 5).await;

        let fee = net.a.add_fee_amount(CHAIN_B, ids[0], FEE_TOKEN, 3).unwrap();
        assert_eq!(fee, FeeInfo::new(FEE_TOKEN, 8));
        assert_eq!(
            net.a.add_fee_amount(CHAIN_B, ids[0], [0x71; 20], 1),
            Err(MessengerError::FeeTokenMismatch { message_id: ids[0] })
        );
        assert_eq!(
            net.a.add_fee_amount(CHAIN_B, ids[0], FEE_TOKEN, 0),
            Err(MessengerError::InvalidFeeAmount(0))
        );

        net.b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();
        assert_eq!(net.a.balance_of(&RELAYER_AB, &FEE_TOKEN), 8);
        assert_eq!(
            net.a.add_fee_amount(CHAIN_B, ids[0], FEE_TOKEN, 1),
            Err(MessengerError::ReceiptAlreadyReceived(ids[0]))
        );
    }

    #[tokio::test]
    async fn test_failed_execution_is_retryable() {
        let net = TwoChains::new();
        let receiver = Arc::new(MockReceiver::failing());
        net.b.register_receiver(APP, receiver.clone());

        let (msg, outcome) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        // delivery stands even though the application call failed
        assert!(outcome.is_confirmed());
        assert!(net.b.is_delivered(CHAIN_A, msg.message_id));
        assert!(net.b.has_failed_execution(CHAIN_A, msg.message_id));
        assert!(receiver.received().is_empty());

        receiver.set_failing(false);
        net.b.retry_message_execution(&msg).unwrap();
        assert_eq!(receiver.received(), vec![(CHAIN_A, SENDER, b"hello".to_vec())]);
        assert_eq!(
            net.b.retry_message_execution(&msg),
            Err(MessengerError::NoFailedExecution(msg.message_id))
        );
    }

    #[tokio::test]
    async fn test_successful_execution_not_retryable() {
        let net = TwoChains::new();
        let receiver = Arc::new(MockReceiver::default());
        net.b.register_receiver(APP, receiver.clone());

        let (msg, _) = net
            .a_to_b
            .send_and_relay(SENDER, request(CHAIN_B, 5), &ctx())
            .await
            .unwrap();
        assert_eq!(receiver.received().len(), 1);
        assert_eq!(
            net.b.retry_message_execution(&msg),
            Err(MessengerError::NoFailedExecution(msg.message_id))
        );
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let net = TwoChains::new();
        let ids = deliver_to_b(&net, 3, 5).await;
        net.b_to_a
            .send_and_relay(SENDER, request(CHAIN_A, 0), &ctx())
            .await
            .unwrap();

        let bytes = net.a.snapshot().to_bytes().unwrap();
        let restored = Messenger::restore(
            MessengerConfig::new(CHAIN_A),
            MessengerSnapshot::from_bytes(&bytes).unwrap(),
        )
        .unwrap();

        assert_eq!(restored.balance_of(&RELAYER_AB, &FEE_TOKEN), 15);
        for id in &ids {
            assert!(restored.batcher().is_credited(CHAIN_B, *id));
        }
        // replaying the same receipts after restart pays nothing
        let replay: Vec<Receipt> = ids.iter().map(|id| Receipt::new(*id, RELAYER_AB)).collect();
        let credited = restored.batcher().process_receipts(
            CHAIN_B,
            &replay,
            restored.registry(),
            restored.ledger(),
        );
        assert_eq!(credited, 0);

        let (next, _) = restored.send(SENDER, request(CHAIN_B, 5)).unwrap();
        assert_eq!(next, MessageId(4));
    }
}
