// Adapters layer: concrete implementations of the domain ports (processes,
// certificate inspection, mail transport).

pub mod openssl;
pub mod shell;
pub mod smtp;
