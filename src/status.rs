//! Order and payment status values and the order state machine.
//!
//! Statuses are stored as upper-case text columns and exposed as closed enums.
//! Every conversion from text goes through [`FromStr`], so an unknown value read
//! from a request surfaces as an error instead of a silent default.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown value: {0}")]
pub struct UnknownValue(pub String);

//--------------------------------------      OrderStatus      ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for payment.
    Pending,
    /// Payment confirmed by the processor.
    Paid,
    /// Being prepared for shipment.
    Processing,
    /// Handed to the carrier.
    Shipping,
    Completed,
    Cancelled,
    /// Payment was declined.
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Whether `self -> next` is an edge of the order state machine.
    ///
    /// Staying in the same status is not an edge; callers treat it as a no-op.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Paid | Failed | Cancelled) => true,
            (Paid, Processing | Shipping | Cancelled) => true,
            (Processing, Shipping | Cancelled) => true,
            (Shipping, Completed | Cancelled) => true,
            _ => false,
        }
    }

    /// Entering this status hands the reserved stock back to the catalog.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Failed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn parses_known_statuses_case_insensitively() {
        assert_eq!("PAID".parse::<OrderStatus>(), Ok(Paid));
        assert_eq!("shipping".parse::<OrderStatus>(), Ok(Shipping));
        assert_eq!(" Cancelled ".parse::<OrderStatus>(), Ok(Cancelled));
        assert!("NOT_A_STATUS".parse::<OrderStatus>().is_err());
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn display_matches_storage_format() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!(
            serde_json::to_string(&Processing).unwrap(),
            "\"PROCESSING\""
        );
    }

    #[test]
    fn payment_path_edges() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Pending));
    }

    #[test]
    fn fulfilment_path_edges() {
        assert!(Paid.can_transition_to(Processing));
        assert!(Paid.can_transition_to(Shipping));
        assert!(Processing.can_transition_to(Shipping));
        assert!(Shipping.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Shipping));
        assert!(!Processing.can_transition_to(Completed));
    }

    #[test]
    fn every_non_terminal_status_can_be_cancelled() {
        for status in OrderStatus::ALL {
            assert_eq!(status.can_transition_to(Cancelled), !status.is_terminal());
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for from in [Completed, Cancelled, Failed] {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn staying_put_is_not_an_edge() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn payment_status_round_trip() {
        assert_eq!("succeeded".parse::<PaymentStatus>(), Ok(PaymentStatus::Succeeded));
        assert_eq!(PaymentStatus::Failed.to_string(), "FAILED");
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
