//! Error types for the Sable protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("too many inputs: {got} > {max}")] TooManyInputs { got: usize, max: usize },
    #[error("too many outputs: {got} > {max}")] TooManyOutputs { got: usize, max: usize },
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("serialization: {0}")] Serialization(String),
    #[error("dust output at index {index}: {value} < {threshold}")] DustOutput { index: usize, value: u64, threshold: u64 },
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
}

/// Rejection reasons surfaced by the mempool acceptance pipeline.
///
/// Callers must not retry a policy rejection without changing the
/// transaction; validation rejections may additionally warrant disconnecting
/// the submitting peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("coinbase transactions are not relayable")] Coinbase,
    #[error("non-standard: {0}")] NonStandard(TransactionError),
    #[error("transaction already in pool: {0}")] AlreadyInPool(String),
    #[error("transaction already confirmed: {0}")] AlreadyConfirmed(String),
    #[error("missing inputs for {0}")] MissingInputs(String),
    #[error("immature coinbase spend of {0}")] ImmatureSpend(String),
    #[error("non-final lock time {0}")] NonFinal(u64),
    #[error("sequence locks not satisfied")] NonBip68Final,
    #[error("conflicts with pool tx {0} which does not signal replaceability")] Conflict(String),
    #[error("spends output of conflicting transaction {0}")] SpendsConflictingTx(String),
    #[error("replacement fee rate does not exceed conflict {0}")] ReplacementFeeRateTooLow(String),
    #[error("insufficient replacement fee: paid {paid}, need {need}")] InsufficientReplacementFee { paid: u64, need: u64 },
    #[error("replacement spends new unconfirmed input {0}")] ReplacementAddsUnconfirmed(String),
    #[error("replacement would evict {count} entries, max {max}")] TooManyReplacements { count: usize, max: usize },
    #[error("fee too low: {fee} < relay minimum {min}")] FeeTooLow { fee: u64, min: u64 },
    #[error("mempool minimum fee not met: {fee} < {min}")] MempoolMinFeeNotMet { fee: u64, min: u64 },
    #[error("absurdly high fee: {fee} > {cap}")] AbsurdFee { fee: u64, cap: u64 },
    #[error("ancestor limits exceeded: {0}")] AncestorLimit(String),
    #[error("script verification failed on input {index}: {detail}")] ScriptVerifyFailed { index: usize, detail: String },
    #[error("pool full")] PoolFull,
    #[error("unsupported dump version: {0}")] UnsupportedDumpVersion(u64),
    #[error("corrupt dump: {0}")] CorruptDump(String),
    #[error("internal: {0}")] Internal(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SableError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Mempool(#[from] MempoolError),
}
