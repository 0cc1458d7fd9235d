//! Deposit/withdrawal events inferred from balance deltas.

use crate::domain::{PositionKey, PriceRatio, TimeMs, TokenAmount};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction of a detected balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionEventType {
    Deposit,
    Withdrawal,
}

impl PositionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionEventType::Deposit => "deposit",
            PositionEventType::Withdrawal => "withdrawal",
        }
    }
}

impl FromStr for PositionEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(PositionEventType::Deposit),
            "withdrawal" => Ok(PositionEventType::Withdrawal),
            other => Err(format!("unknown event type {:?}", other)),
        }
    }
}

/// An append-only record of one detected deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    /// Unique identifier derived from the event's fields and its position
    /// in the pair's log.
    pub event_key: String,
    pub key: PositionKey,
    pub event_type: PositionEventType,
    /// Magnitude of the change, always positive.
    pub amount_change: TokenAmount,
    pub amount_after: TokenAmount,
    /// Pool ratio observed with the change (LP deposits).
    pub price_ratio_at_event: Option<PriceRatio>,
    pub detected_at: TimeMs,
}

impl PositionEvent {
    pub fn new(
        key: PositionKey,
        event_type: PositionEventType,
        amount_change: TokenAmount,
        amount_after: TokenAmount,
        price_ratio_at_event: Option<PriceRatio>,
        detected_at: TimeMs,
    ) -> Self {
        let event_key = Self::compute_event_key(&key, 0, event_type, amount_after, detected_at);
        Self {
            event_key,
            key,
            event_type,
            amount_change,
            amount_after,
            price_ratio_at_event,
            detected_at,
        }
    }

    /// Re-key the event as the pair's `sequence`-th (zero-based) event.
    ///
    /// `new` keys an event as if it were the pair's first. The reconciler
    /// calls this with the pair's stored event count inside the write
    /// transaction, so a balance that returns to an earlier value within the
    /// same millisecond still yields a distinct key.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.event_key = Self::compute_event_key(
            &self.key,
            sequence,
            self.event_type,
            self.amount_after,
            self.detected_at,
        );
        self
    }

    /// Hash of (wallet, token unit, sequence, type, detection time, resulting
    /// amount), truncated to 16 bytes of SHA-256.
    pub fn compute_event_key(
        key: &PositionKey,
        sequence: u64,
        event_type: PositionEventType,
        amount_after: TokenAmount,
        detected_at: TimeMs,
    ) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, key.wallet.as_str());
        hash_var(&mut hasher, key.token_unit.as_str());
        hasher.update(sequence.to_le_bytes());
        hash_var(&mut hasher, event_type.as_str());
        hasher.update(detected_at.as_ms().to_le_bytes());
        hash_var(&mut hasher, &amount_after.to_canonical_string());

        let hash = hasher.finalize();
        format!("evt:{}", hex::encode(&hash[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TokenUnit, WalletAddress};

    fn key(wallet: &str) -> PositionKey {
        PositionKey::new(
            WalletAddress::new(wallet.to_string()),
            TokenUnit::new("lp01".to_string()),
        )
    }

    #[test]
    fn event_key_is_deterministic() {
        let a = PositionEvent::new(
            key("addr1"),
            PositionEventType::Deposit,
            TokenAmount::new(10),
            TokenAmount::new(110),
            None,
            TimeMs::new(1000),
        );
        let b = PositionEvent::new(
            key("addr1"),
            PositionEventType::Deposit,
            TokenAmount::new(10),
            TokenAmount::new(110),
            PriceRatio::new(1.5),
            TimeMs::new(1000),
        );
        assert_eq!(a.event_key, b.event_key);
        assert!(a.event_key.starts_with("evt:"));
        assert_eq!(a.event_key.len(), 4 + 32);
    }

    #[test]
    fn event_key_separates_wallets_and_types() {
        let base = PositionEvent::compute_event_key(
            &key("addr1"),
            0,
            PositionEventType::Deposit,
            TokenAmount::new(5),
            TimeMs::new(1),
        );
        let other_wallet = PositionEvent::compute_event_key(
            &key("addr2"),
            0,
            PositionEventType::Deposit,
            TokenAmount::new(5),
            TimeMs::new(1),
        );
        let other_type = PositionEvent::compute_event_key(
            &key("addr1"),
            0,
            PositionEventType::Withdrawal,
            TokenAmount::new(5),
            TimeMs::new(1),
        );
        assert_ne!(base, other_wallet);
        assert_ne!(base, other_type);
    }

    #[test]
    fn event_key_separates_repeated_changes_by_sequence() {
        let first = PositionEvent::new(
            key("addr1"),
            PositionEventType::Deposit,
            TokenAmount::new(1000),
            TokenAmount::new(2000),
            None,
            TimeMs::new(5),
        );
        let again = first.clone().with_sequence(2);
        assert_eq!(first.clone().with_sequence(0), first);
        assert_ne!(again.event_key, first.event_key);
        assert_eq!(again.amount_after, first.amount_after);
        assert_eq!(again.detected_at, first.detected_at);
    }

    #[test]
    fn event_type_parse() {
        assert_eq!(
            PositionEventType::from_str("withdrawal").unwrap(),
            PositionEventType::Withdrawal
        );
        assert!(PositionEventType::from_str("mint").is_err());
    }
}
