use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;

use super::abi::IUnirep;
use crate::domain::attestation::Attestation;
use crate::domain::events::{
    AttestationSubmitted, EpochEnded, EventMeta, LoggedEvent, ReputationNullifiersSpent,
    SequencerMarker, UserSignedUp, UserStateTransitioned,
};
use crate::ports::events::{EventBatch, EventSource, EventSourceError};

/// `EventSource` over an Ethereum JSON-RPC endpoint.
#[derive(Clone)]
pub struct EthereumEventSource {
    provider: DynProvider,
    unirep: Address,
}

impl EthereumEventSource {
    pub fn new(rpc_url: &str, unirep: Address) -> Result<Self, EventSourceError> {
        let provider = DynProvider::new(
            ProviderBuilder::new().connect_http(
                rpc_url
                    .parse()
                    .map_err(|e| EventSourceError::Rpc(format!("invalid RPC URL: {e}")))?,
            ),
        );
        Ok(Self { provider, unirep })
    }

    fn filter(&self, from: u64, to: u64) -> Filter {
        Filter::new()
            .address(self.unirep)
            .event_signature(vec![
                IUnirep::Sequencer::SIGNATURE_HASH,
                IUnirep::UserSignedUp::SIGNATURE_HASH,
                IUnirep::AttestationSubmitted::SIGNATURE_HASH,
                IUnirep::EpochEnded::SIGNATURE_HASH,
                IUnirep::UserStateTransitioned::SIGNATURE_HASH,
                IUnirep::ReputationNullifiersSpent::SIGNATURE_HASH,
            ])
            .from_block(from)
            .to_block(to)
    }
}

enum Decoded {
    Marker(SequencerMarker),
    Event(LoggedEvent),
}

fn decode_error(meta: &EventMeta, reason: impl ToString) -> EventSourceError {
    EventSourceError::Decode {
        block_number: meta.block_number,
        log_index: meta.log_index,
        reason: reason.to_string(),
    }
}

fn to_u64(meta: &EventMeta, name: &str, value: U256) -> Result<u64, EventSourceError> {
    u64::try_from(value).map_err(|_| decode_error(meta, format!("{name} {value} exceeds u64")))
}

fn to_fields(values: Vec<U256>) -> Vec<B256> {
    values.into_iter().map(B256::from).collect()
}

fn log_meta(log: &Log) -> Result<EventMeta, EventSourceError> {
    let block_number = log
        .block_number
        .ok_or_else(|| EventSourceError::Rpc("log without block number".into()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| EventSourceError::Rpc("log without log index".into()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| EventSourceError::Rpc("log without transaction hash".into()))?;
    Ok(EventMeta {
        block_number,
        log_index,
        transaction_hash,
    })
}

fn decode_log(log: &Log) -> Result<Decoded, EventSourceError> {
    let meta = log_meta(log)?;
    let topic = *log
        .topics()
        .first()
        .ok_or_else(|| decode_error(&meta, "log without topics"))?;
    let failed = |e: alloy::sol_types::Error| decode_error(&meta, e);

    if topic == IUnirep::Sequencer::SIGNATURE_HASH {
        let event = log.log_decode::<IUnirep::Sequencer>().map_err(failed)?;
        return Ok(Decoded::Marker(SequencerMarker {
            meta,
            event_type: event.inner.userEvent,
        }));
    }

    let event = if topic == IUnirep::UserSignedUp::SIGNATURE_HASH {
        let e = log.log_decode::<IUnirep::UserSignedUp>().map_err(failed)?.inner.data;
        LoggedEvent::new(
            meta,
            UserSignedUp {
                epoch: to_u64(&meta, "epoch", e.epoch)?,
                identity_commitment: B256::from(e.identityCommitment),
                hashed_leaf: B256::from(e.hashedLeaf),
            },
        )
    } else if topic == IUnirep::AttestationSubmitted::SIGNATURE_HASH {
        let e = log
            .log_decode::<IUnirep::AttestationSubmitted>()
            .map_err(failed)?
            .inner
            .data;
        LoggedEvent::new(
            meta,
            AttestationSubmitted {
                epoch: to_u64(&meta, "epoch", e.epoch)?,
                epoch_key: B256::from(e.epochKey),
                attestation: Attestation {
                    attester_id: to_u64(&meta, "attesterId", e.attesterId)?,
                    pos_rep: to_u64(&meta, "posRep", e.posRep)?,
                    neg_rep: to_u64(&meta, "negRep", e.negRep)?,
                    graffiti: B256::from(e.graffiti),
                    overwrite_graffiti: e.overwriteGraffiti,
                },
            },
        )
    } else if topic == IUnirep::EpochEnded::SIGNATURE_HASH {
        let e = log.log_decode::<IUnirep::EpochEnded>().map_err(failed)?.inner.data;
        if e.epochKeys.len() != e.hashchainResults.len() {
            return Err(decode_error(
                &meta,
                format!(
                    "{} epoch keys but {} hash chains",
                    e.epochKeys.len(),
                    e.hashchainResults.len()
                ),
            ));
        }
        LoggedEvent::new(
            meta,
            EpochEnded {
                epoch: to_u64(&meta, "epoch", e.epoch)?,
                epoch_key_hashchains: to_fields(e.epochKeys)
                    .into_iter()
                    .zip(to_fields(e.hashchainResults))
                    .collect(),
            },
        )
    } else if topic == IUnirep::UserStateTransitioned::SIGNATURE_HASH {
        let e = log
            .log_decode::<IUnirep::UserStateTransitioned>()
            .map_err(failed)?
            .inner
            .data;
        LoggedEvent::new(
            meta,
            UserStateTransitioned {
                from_epoch: to_u64(&meta, "fromEpoch", e.fromEpoch)?,
                to_epoch: to_u64(&meta, "toEpoch", e.toEpoch)?,
                new_gst_leaf: B256::from(e.newGstLeaf),
                epk_nullifiers: to_fields(e.epkNullifiers),
                attestation_nullifiers: to_fields(e.attestationNullifiers),
            },
        )
    } else if topic == IUnirep::ReputationNullifiersSpent::SIGNATURE_HASH {
        let e = log
            .log_decode::<IUnirep::ReputationNullifiersSpent>()
            .map_err(failed)?
            .inner
            .data;
        LoggedEvent::new(
            meta,
            ReputationNullifiersSpent {
                epoch: to_u64(&meta, "epoch", e.epoch)?,
                nullifiers: to_fields(e.nullifiers),
            },
        )
    } else {
        return Err(decode_error(&meta, format!("unexpected topic {topic}")));
    };
    Ok(Decoded::Event(event))
}

impl EventSource for EthereumEventSource {
    async fn head_block(&self) -> Result<u64, EventSourceError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| EventSourceError::Rpc(format!("block number query: {e}")))
    }

    async fn fetch(&self, from: u64, to: u64) -> Result<EventBatch, EventSourceError> {
        let mut logs = self
            .provider
            .get_logs(&self.filter(from, to))
            .await
            .map_err(|e| EventSourceError::Rpc(format!("log query {from}..{to}: {e}")))?;
        logs.sort_by_key(|l| (l.block_number, l.log_index));

        let mut batch = EventBatch {
            from_block: from,
            to_block: to,
            ..EventBatch::default()
        };
        for log in &logs {
            match decode_log(log)? {
                Decoded::Marker(marker) => batch.markers.push(marker),
                Decoded::Event(event) => batch.events.push(event),
            }
        }
        tracing::debug!(
            from,
            to,
            markers = batch.markers.len(),
            events = batch.events.len(),
            "fetched logs"
        );
        Ok(batch)
    }
}
