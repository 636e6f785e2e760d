//! Fraud report aggregates keyed by canonical phone number

use super::{parse_datetime, Database, DbError, DbResult, FraudReport};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

impl Database {
    /// Look up the aggregate for a canonical (11-digit) number
    pub async fn check_number(&self, phone_number: &str) -> DbResult<Option<FraudReport>> {
        let phone_number = phone_number.to_string();
        self.with_conn(move |conn| find_report(conn, &phone_number)).await
    }

    /// Record one fraud report.
    ///
    /// An existing row has its count incremented and the new description
    /// appended on its own line; otherwise a row is created with a count of
    /// one. The read and the write share one immediate transaction so
    /// concurrent reports of the same number all land.
    pub async fn report_fraud(
        &self,
        phone_number: &str,
        description: &str,
        reporter_ip: &str,
    ) -> DbResult<FraudReport> {
        let phone_number = phone_number.to_string();
        let description = description.trim().to_string();
        let reporter_ip = reporter_ip.to_string();

        self.with_tx(move |tx| {
            let now = Utc::now().to_rfc3339();

            if find_report(tx, &phone_number)?.is_some() {
                tx.execute(
                    "UPDATE fraud_reports
                     SET report_count = report_count + 1,
                         is_fraud = 1,
                         description = CASE WHEN description = '' THEN ?1
                                            ELSE description || char(10) || ?1 END,
                         last_updated_at = ?2
                     WHERE phone_number = ?3",
                    params![description, now, phone_number],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO fraud_reports (phone_number, is_fraud, report_count, description,
                                                first_reported_at, last_updated_at, reporter_ip)
                     VALUES (?1, 1, 1, ?2, ?3, ?3, ?4)",
                    params![phone_number, description, now, reporter_ip],
                )?;
            }

            let report = find_report(tx, &phone_number)?.ok_or_else(|| {
                DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
            })?;

            tracing::info!(
                phone_number = %report.phone_number,
                report_count = report.report_count,
                "Recorded fraud report"
            );
            Ok(report)
        })
        .await
    }
}

fn find_report(conn: &Connection, phone_number: &str) -> DbResult<Option<FraudReport>> {
    conn.query_row(
        "SELECT phone_number, is_fraud, report_count, description, first_reported_at,
                last_updated_at, reporter_ip
         FROM fraud_reports WHERE phone_number = ?1",
        params![phone_number],
        parse_report_row,
    )
    .optional()
    .map_err(DbError::from)
}

fn parse_report_row(row: &Row<'_>) -> rusqlite::Result<FraudReport> {
    Ok(FraudReport {
        phone_number: row.get(0)?,
        is_fraud: row.get(1)?,
        report_count: row.get(2)?,
        description: row.get(3)?,
        first_reported_at: parse_datetime(&row.get::<_, String>(4)?),
        last_updated_at: parse_datetime(&row.get::<_, String>(5)?),
        reporter_ip: row.get(6)?,
    })
}
