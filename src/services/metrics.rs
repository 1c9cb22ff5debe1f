use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref SELECTIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_selections_total",
        "Weekly selection submissions by status",
        &["status"]
    ).unwrap();

    pub static ref REDEMPTIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_redemptions_total",
        "Meal redemptions by meal type and status",
        &["meal_type", "status"]
    ).unwrap();

    pub static ref TOKENS_ISSUED_COUNTER: CounterVec = register_counter_vec!(
        "api_tokens_issued_total",
        "Redemption tokens issued by owner kind",
        &["owner_kind"]
    ).unwrap();

    pub static ref ORDERS_COUNTER: CounterVec = register_counter_vec!(
        "api_guest_orders_total",
        "Guest orders by status",
        &["status"]
    ).unwrap();

    pub static ref WALLET_TXNS_COUNTER: CounterVec = register_counter_vec!(
        "api_wallet_transactions_total",
        "Wallet ledger writes by kind and owner kind",
        &["kind", "owner_kind"]
    ).unwrap();

    pub static ref OTP_EMAILS_COUNTER: CounterVec = register_counter_vec!(
        "api_otp_emails_total",
        "Guest OTP emails by status",
        &["status"]
    ).unwrap();
}
