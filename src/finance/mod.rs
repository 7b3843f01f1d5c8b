//! Financial derivation engine
//!
//! Sole writer of an order's derived figures. Every run fetches a fresh
//! snapshot of the three active rates, computes the figures and produces
//! one calculation-history row; the caller persists order and row together
//! through the repository's `*_with_history` methods.

use crate::audit;
use crate::clock::Clock;
use crate::error::BotError;
use crate::models::{CalculationHistory, DerivedFigures, FinancialSettings, Order, RateKind};
use crate::state::FinancialRepository;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NET_PROFIT_CALCULATION: &str = "net_profit";

/// Rates in effect for one derivation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    pub tax: f64,
    pub marketing: f64,
    pub rental: f64,
}

impl RateSnapshot {
    pub fn combined(&self) -> f64 {
        self.tax + self.marketing + self.rental
    }

    pub fn get(&self, kind: RateKind) -> f64 {
        match kind {
            RateKind::Tax => self.tax,
            RateKind::Marketing => self.marketing,
            RateKind::Rental => self.rental,
        }
    }
}

/// Pure derivation for a gross amount
pub fn compute(gross: f64, rates: &RateSnapshot, at: DateTime<Utc>) -> DerivedFigures {
    let tax_amount = gross * rates.tax / 100.0;
    let marketing_cost = gross * rates.marketing / 100.0;
    let rental_cost = gross * rates.rental / 100.0;

    DerivedFigures {
        tax_percentage: rates.tax,
        tax_amount,
        marketing_percentage: rates.marketing,
        marketing_cost,
        rental_percentage: rates.rental,
        rental_cost,
        net_profit: gross - tax_amount - marketing_cost - rental_cost,
        calculated_at: Some(at),
    }
}

/// Result of re-checking an order's history checksums
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCheck {
    pub order_id: i64,
    pub rows: usize,
    /// Ids of rows whose content no longer matches the checksum
    pub mismatched: Vec<i64>,
}

impl HistoryCheck {
    pub fn is_intact(&self) -> bool {
        self.mismatched.is_empty()
    }
}

pub struct FinancialEngine {
    rates: Arc<dyn FinancialRepository>,
    clock: Arc<dyn Clock>,
}

impl FinancialEngine {
    pub fn new(rates: Arc<dyn FinancialRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { rates, clock }
    }

    /// Current active rates. Any missing rate aborts with an error naming it.
    pub async fn current_rates(&self) -> Result<RateSnapshot> {
        let mut values = [0.0; 3];
        for (slot, kind) in values.iter_mut().zip(RateKind::ALL) {
            let setting = self
                .rates
                .current_rate(kind)
                .await
                .map_err(|e| BotError::RateUnavailable {
                    rate: kind,
                    source: Box::new(e),
                })?;
            *slot = setting.percentage_value;
        }

        Ok(RateSnapshot {
            tax: values[0],
            marketing: values[1],
            rental: values[2],
        })
    }

    /// Writes fresh derived figures into `order` and returns the history row
    /// describing the run. Nothing is persisted here.
    pub async fn derive(&self, order: &mut Order) -> Result<CalculationHistory> {
        let rates = self.current_rates().await?;
        let at = audit::stored_precision(self.clock.now());

        order.derived = compute(order.total_amount, &rates, at);

        debug!(
            order = %order.order_number,
            gross = order.total_amount,
            net_profit = order.derived.net_profit,
            "Order figures derived"
        );

        Ok(CalculationHistory {
            id: 0,
            order_id: order.id,
            calculation_type: NET_PROFIT_CALCULATION.to_string(),
            input_value: order.total_amount,
            percentage_used: rates.combined(),
            calculated_amount: order.derived.net_profit,
            calculation_timestamp: at,
            checksum: String::new(),
        })
    }

    /// Store a new active rate; it becomes current immediately
    pub async fn set_rate(&self, kind: RateKind, percentage: f64, created_by: i64) -> Result<FinancialSettings> {
        if !percentage.is_finite() {
            return Err(BotError::invalid("Invalid percentage"));
        }

        let setting = self
            .rates
            .create_setting(FinancialSettings {
                id: 0,
                setting_name: kind,
                percentage_value: percentage,
                is_active: true,
                created_by,
                created_at: self.clock.now(),
            })
            .await?;

        info!(rate = %kind, percentage, created_by, "Rate updated");
        Ok(setting)
    }

    pub async fn history(&self, order_id: i64) -> Result<Vec<CalculationHistory>> {
        self.rates.calculation_history(order_id).await
    }

    pub async fn verify_history(&self, order_id: i64) -> Result<HistoryCheck> {
        let rows = self.rates.calculation_history(order_id).await?;
        let mismatched: Vec<i64> = rows
            .iter()
            .filter(|row| !audit::verify(row))
            .map(|row| row.id)
            .collect();

        if !mismatched.is_empty() {
            warn!(order_id, ?mismatched, "Calculation history checksum mismatch");
        }

        Ok(HistoryCheck {
            order_id,
            rows: rows.len(),
            mismatched,
        })
    }
}
