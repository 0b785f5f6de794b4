//! Context-free transaction standardness checks.
//!
//! [`validate_transaction_structure`] covers format and internal
//! consistency; [`check_outputs_not_dust`] applies the relay-policy dust
//! rule. Contextual checks (input availability, signatures, maturity, lock
//! evaluation) belong to the mempool acceptance pipeline, which also
//! consumes the coins and chain views.
//!
//! Coinbase transactions are only structurally validated here; their reward
//! amount is checked during block validation.

use std::collections::HashSet;

use crate::constants::{
    DUST_RELAY_MULTIPLIER, MAX_COINBASE_DATA, MAX_INPUTS, MAX_OUTPUTS, MAX_TX_SIZE,
    OUTPUT_SPEND_SIZE,
};
use crate::error::TransactionError;
use crate::types::{FeeRate, Transaction, TxOutput};

/// Validate transaction structure (context-free).
///
/// Checks that apply to both coinbase and regular transactions:
/// - Non-empty inputs and outputs, within [`MAX_INPUTS`]/[`MAX_OUTPUTS`]
/// - All output values are non-zero
/// - Total output value does not overflow
/// - Serialized size is within [`MAX_TX_SIZE`]
///
/// Additional coinbase-specific checks:
/// - Exactly one input with null outpoint
/// - Coinbase data within size limit
///
/// Additional regular transaction checks:
/// - No null outpoints
/// - No duplicate input outpoints
/// - Each input carries 64-byte signature and 32-byte public key
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TransactionError> {
    // --- Common checks ---

    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    if tx.inputs.len() > MAX_INPUTS {
        return Err(TransactionError::TooManyInputs { got: tx.inputs.len(), max: MAX_INPUTS });
    }

    if tx.outputs.len() > MAX_OUTPUTS {
        return Err(TransactionError::TooManyOutputs { got: tx.outputs.len(), max: MAX_OUTPUTS });
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value == 0 {
            return Err(TransactionError::ZeroValueOutput(i));
        }
    }

    if tx.total_output_value().is_none() {
        return Err(TransactionError::ValueOverflow);
    }

    let size = tx.vsize()? as usize;
    if size > MAX_TX_SIZE {
        return Err(TransactionError::OversizedTransaction { size, max: MAX_TX_SIZE });
    }

    // --- Type-specific checks ---

    if tx.is_coinbase() {
        validate_coinbase_structure(tx)?;
    } else {
        validate_regular_structure(tx)?;
    }

    Ok(())
}

/// Validate coinbase-specific structure.
///
/// - Exactly one input with null outpoint
/// - Coinbase data (signature field) within [`MAX_COINBASE_DATA`] bytes
fn validate_coinbase_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.len() != 1 {
        return Err(TransactionError::InvalidCoinbase(
            "must have exactly one input".into(),
        ));
    }

    if !tx.inputs[0].previous_output.is_null() {
        return Err(TransactionError::InvalidCoinbase(
            "input must be null outpoint".into(),
        ));
    }

    if tx.inputs[0].signature.len() > MAX_COINBASE_DATA {
        return Err(TransactionError::InvalidCoinbase(format!(
            "data too large: {} > {MAX_COINBASE_DATA}",
            tx.inputs[0].signature.len(),
        )));
    }

    Ok(())
}

/// Validate non-coinbase transaction structure.
///
/// - No null outpoints
/// - No duplicate input outpoints
/// - 64-byte signature and 32-byte public key on each input
fn validate_regular_structure(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());

    for (i, input) in tx.inputs.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TransactionError::NullOutpointInRegularTx(i));
        }

        if !seen.insert(&input.previous_output) {
            return Err(TransactionError::DuplicateInput(
                input.previous_output.to_string(),
            ));
        }

        if input.signature.len() != 64 {
            return Err(TransactionError::InvalidSignature { index: i });
        }

        if input.public_key.len() != 32 {
            return Err(TransactionError::InvalidSignature { index: i });
        }
    }

    Ok(())
}

/// The value below which an output is dust at the given relay fee rate.
///
/// Spending an output later costs roughly [`OUTPUT_SPEND_SIZE`] virtual
/// bytes; an output worth less than [`DUST_RELAY_MULTIPLIER`] times that
/// spend fee is uneconomical to ever spend.
pub fn dust_threshold(min_relay_fee: FeeRate) -> u64 {
    min_relay_fee
        .fee(OUTPUT_SPEND_SIZE)
        .saturating_mul(DUST_RELAY_MULTIPLIER)
}

/// Whether a single output is dust at the given relay fee rate.
pub fn is_dust(output: &TxOutput, min_relay_fee: FeeRate) -> bool {
    output.value < dust_threshold(min_relay_fee)
}

/// Reject any dust output in `tx` at the given relay fee rate.
pub fn check_outputs_not_dust(
    tx: &Transaction,
    min_relay_fee: FeeRate,
) -> Result<(), TransactionError> {
    let threshold = dust_threshold(min_relay_fee);
    for (index, output) in tx.outputs.iter().enumerate() {
        if output.value < threshold {
            return Err(TransactionError::DustOutput {
                index,
                value: output.value,
                threshold,
            });
        }
    }
    Ok(())
}
