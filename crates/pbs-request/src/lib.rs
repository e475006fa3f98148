pub mod headers;
pub mod parser;
pub mod wire;

pub use headers::obtain_transaction_origin;
pub use parser::parse_common_v2;
pub use wire::{BudgetType, DataEntry, ExhaustedResponseLegacy, ExhaustedResponseProto,
    KeyBodyV1, KeyBodyV2, TokenWrapper, TransactionRequest, TransactionRequestV1,
    TransactionRequestV2};
