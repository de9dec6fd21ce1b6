//! # Reports
//!
//! Cashier reports over local business days.
//!
//! Days are cut at local midnight: the restaurant's UTC offset turns a
//! `[first_day, last_day]` range into a half-open UTC window.
//!
//! ```text
//!   local 2026-10-18 00:00 (+07:00)        local 2026-10-19 00:00
//!            │                                       │
//!   UTC 2026-10-17 17:00 ─────── window ───── 2026-10-18 17:00 (exclusive)
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use tracing::debug;

use quan_core::{CancellationStats, DailySummary, TopItem, ValidationError};
use quan_db::Database;

use crate::config::ReportSettings;
use crate::error::{EngineError, EngineResult};

const MAX_TOP_ITEMS: i64 = 100;

#[derive(Clone)]
pub struct ReportService {
    db: Database,
    utc_offset_minutes: i32,
}

impl ReportService {
    pub fn new(db: Database, settings: &ReportSettings) -> Self {
        ReportService {
            db,
            utc_offset_minutes: settings.utc_offset_minutes,
        }
    }

    /// Revenue and item losses for one local day.
    ///
    /// `utc_offset_minutes` overrides the configured offset.
    pub async fn daily_summary(
        &self,
        date: NaiveDate,
        utc_offset_minutes: Option<i32>,
    ) -> EngineResult<DailySummary> {
        let offset = utc_offset_minutes.unwrap_or(self.utc_offset_minutes);
        let (from, to) = local_window(date, date, offset)?;
        debug!(%date, %from, %to, "Building daily summary");

        let summary = self
            .db
            .reports()
            .daily_summary(from, to, &date.format("%Y-%m-%d").to_string())
            .await?;
        Ok(summary)
    }

    /// Best sellers over `[first_day, last_day]`, both inclusive.
    pub async fn top_items(
        &self,
        first_day: NaiveDate,
        last_day: NaiveDate,
        limit: i64,
    ) -> EngineResult<Vec<TopItem>> {
        let (from, to) = local_window(first_day, last_day, self.utc_offset_minutes)?;
        let items = self
            .db
            .reports()
            .top_items(from, to, limit.clamp(1, MAX_TOP_ITEMS))
            .await?;
        Ok(items)
    }

    pub async fn cancellation_stats(
        &self,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> EngineResult<CancellationStats> {
        let (from, to) = local_window(first_day, last_day, self.utc_offset_minutes)?;
        let stats = self.db.reports().cancellation_stats(from, to).await?;
        Ok(stats)
    }

    /// Today's date in the restaurant's time zone.
    pub fn today(&self) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => Utc::now().date_naive(),
        }
    }
}

/// UTC window from local midnight of `first_day` to local midnight after
/// `last_day`.
fn local_window(
    first_day: NaiveDate,
    last_day: NaiveDate,
    utc_offset_minutes: i32,
) -> EngineResult<(DateTime<Utc>, DateTime<Utc>)> {
    if last_day < first_day {
        return Err(ValidationError::InvalidFormat {
            field: "to".to_string(),
            reason: "range ends before it starts".to_string(),
        }
        .into());
    }

    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
        EngineError::InvalidConfig(format!("UTC offset out of range: {} minutes", utc_offset_minutes))
    })?;

    let midnight = |day: NaiveDate| {
        offset
            .from_local_datetime(&day.and_time(chrono::NaiveTime::MIN))
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| EngineError::Internal(format!("No local midnight for {}", day)))
    };

    let from = midnight(first_day)?;
    let to = midnight(last_day)? + Duration::days(1);
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support as ts;
    use quan_core::{OrderItemStatus, PaymentMethod};
    use quan_db::OrderRepository;

    #[test]
    fn test_local_window_uses_offset() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let (from, to) = local_window(day, day, 420).unwrap();
        assert_eq!(from.to_rfc3339(), "2026-10-17T17:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-10-18T17:00:00+00:00");

        let next = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let (_, to) = local_window(day, next, 0).unwrap();
        assert_eq!(to.to_rfc3339(), "2026-10-21T00:00:00+00:00");
    }

    #[test]
    fn test_local_window_rejects_reversed_range() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let before = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(local_window(day, before, 420).is_err());
        assert!(local_window(day, day, 24 * 60).unwrap_err().is_config_error());
    }

    #[tokio::test]
    async fn test_daily_summary_for_today() {
        let (db, _hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        ts::item(&db, &order, &pho, OrderItemStatus::Served).await;
        ts::item(&db, &order, &pho, OrderItemStatus::Returned).await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            OrderRepository::mark_paid_in(&mut conn, &order.id, PaymentMethod::Momo, Some("t1"), Utc::now())
                .await
                .unwrap();
        }

        let reports = ReportService::new(db.clone(), &ReportSettings::default());
        let today = reports.today();
        let summary = reports.daily_summary(today, None).await.unwrap();
        assert_eq!(summary.paid_orders, 1);
        assert_eq!(summary.gross_revenue, 65_000);
        assert_eq!(summary.returned_items, 1);
        assert_eq!(summary.date, today.format("%Y-%m-%d").to_string());

        let top = reports.top_items(today, today, 0).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].quantity, 1);

        let stats = reports.cancellation_stats(today, today).await.unwrap();
        assert_eq!(stats.requests, 0);
    }
}
