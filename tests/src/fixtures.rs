//! Shared fixtures: two chains wired through a [`LocalNetwork`].

use std::sync::{Arc, Once};
use std::time::Duration;
use xchain_messenger::{
    Address, Amount, ChainId, DeliveryContext, DeliveryEngine, FeeInfo, InMemoryAttestationService,
    LocalNetwork, Messenger, MessengerConfig, SendRequest, SendRequestBuilder,
};
use xchain_telemetry::{init_logging, TelemetryConfig};

/// Chain A.
pub const CHAIN_A: ChainId = ChainId::from_byte(0xA);
/// Chain B.
pub const CHAIN_B: ChainId = ChainId::from_byte(0xB);
/// Application account sending messages.
pub const SENDER: Address = [0x11; 20];
/// Application contract receiving messages.
pub const APP: Address = [0x22; 20];
/// Fee token.
pub const FEE_TOKEN: Address = [0x70; 20];
/// Relayer delivering A -> B.
pub const RELAYER_AB: Address = [0xAB; 20];
/// Relayer delivering B -> A.
pub const RELAYER_BA: Address = [0xBA; 20];
/// Required gas limit used by [`request`].
pub const REQUIRED_GAS: u64 = 100_000;

static LOGGING: Once = Once::new();

/// Install the test subscriber once per process.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let config = TelemetryConfig::from_env().with_log_level("warn");
        if let Err(e) = init_logging(&config) {
            eprintln!("test logging not installed: {e}");
        }
    });
}

/// Engine type used by the fixtures.
pub type Engine = DeliveryEngine<InMemoryAttestationService, LocalNetwork>;

/// Two messengers and an engine per direction.
pub struct TwoChains {
    /// Messenger on chain A.
    pub a: Arc<Messenger>,
    /// Messenger on chain B.
    pub b: Arc<Messenger>,
    /// Shared attestation service.
    pub attestation: Arc<InMemoryAttestationService>,
    /// Relays A -> B as [`RELAYER_AB`].
    pub a_to_b: Engine,
    /// Relays B -> A as [`RELAYER_BA`].
    pub b_to_a: Engine,
}

/// Builder for [`TwoChains`].
pub struct TwoChainsBuilder {
    num_signers: u32,
    signer_floor: u32,
    inclusion_delay: Option<Duration>,
    attestation_latency: Option<Duration>,
}

impl Default for TwoChainsBuilder {
    fn default() -> Self {
        Self {
            num_signers: 5,
            signer_floor: 1,
            inclusion_delay: None,
            attestation_latency: None,
        }
    }
}

impl TwoChainsBuilder {
    /// Signers reported by the attestation service.
    pub fn num_signers(mut self, n: u32) -> Self {
        self.num_signers = n;
        self
    }

    /// Minimum signers the destination charges for.
    pub fn signer_floor(mut self, n: u32) -> Self {
        self.signer_floor = n;
        self
    }

    /// Inclusion latency.
    pub fn inclusion_delay(mut self, delay: Duration) -> Self {
        self.inclusion_delay = Some(delay);
        self
    }

    /// Attestation latency.
    pub fn attestation_latency(mut self, latency: Duration) -> Self {
        self.attestation_latency = Some(latency);
        self
    }

    /// Wire everything up.
    pub fn build(self) -> TwoChains {
        init_test_logging();
        let a = Arc::new(Messenger::new(MessengerConfig::new(CHAIN_A)).expect("config A"));
        let b = Arc::new(Messenger::new(MessengerConfig::new(CHAIN_B)).expect("config B"));

        let mut attestation = InMemoryAttestationService::new(b"validator-set".to_vec(), self.num_signers)
            .expect("attestation service");
        if let Some(latency) = self.attestation_latency {
            attestation = attestation.with_latency(latency);
        }
        let attestation = Arc::new(attestation);

        let mut network = LocalNetwork::new(attestation.clone()).with_signer_floor(self.signer_floor);
        if let Some(delay) = self.inclusion_delay {
            network = network.with_inclusion_delay(delay);
        }
        network.add_chain(a.clone());
        network.add_chain(b.clone());
        let network = Arc::new(network);

        let a_to_b = DeliveryEngine::new(
            a.clone(),
            b.clone(),
            attestation.clone(),
            network.clone(),
            RELAYER_AB,
            RELAYER_AB,
        );
        let b_to_a = DeliveryEngine::new(
            b.clone(),
            a.clone(),
            attestation.clone(),
            network,
            RELAYER_BA,
            RELAYER_BA,
        );

        TwoChains {
            a,
            b,
            attestation,
            a_to_b,
            b_to_a,
        }
    }
}

impl TwoChains {
    /// Default network.
    pub fn new() -> Self {
        TwoChainsBuilder::default().build()
    }

    /// Customised network.
    pub fn builder() -> TwoChainsBuilder {
        TwoChainsBuilder::default()
    }
}

impl Default for TwoChains {
    fn default() -> Self {
        Self::new()
    }
}

/// Request to [`APP`] on `destination` paying `fee` in [`FEE_TOKEN`].
pub fn request(destination: ChainId, fee: Amount) -> SendRequest {
    SendRequestBuilder::new(destination, APP)
        .fee(FeeInfo::new(FEE_TOKEN, fee))
        .required_gas_limit(REQUIRED_GAS)
        .payload(b"hello".to_vec())
        .build()
}

/// Context with a generous deadline.
pub fn ctx() -> DeliveryContext {
    DeliveryContext::new(Duration::from_secs(30))
}
