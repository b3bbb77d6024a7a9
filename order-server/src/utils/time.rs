//! 时间工具函数: 业务时区转换
//!
//! 营业日 (流水号、每日限量) 以业务时区的自然日为界，
//! repository 层只接收 `i64` Unix millis。

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;

/// 日期 + 时分秒 → Unix millis (业务时区)
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
pub fn date_hms_to_millis(date: NaiveDate, hour: u32, min: u32, sec: u32, tz: Tz) -> i64 {
    let Some(naive) = date.and_hms_opt(hour, min, sec) else {
        return date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis();
    };
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 日期开始 (00:00:00) → Unix millis (业务时区)
pub fn day_start_millis(date: NaiveDate, tz: Tz) -> i64 {
    date_hms_to_millis(date, 0, 0, 0, tz)
}

/// 时间戳所在的营业日 (业务时区)
pub fn business_date(millis: i64, tz: Tz) -> NaiveDate {
    match tz.timestamp_millis_opt(millis).latest() {
        Some(dt) => dt.date_naive(),
        None => chrono::Utc::now().with_timezone(&tz).date_naive(),
    }
}

/// 时间戳所在营业日的零点 (业务时区)
pub fn business_day_start(millis: i64, tz: Tz) -> i64 {
    day_start_millis(business_date(millis, tz), tz)
}

/// N 天 → 毫秒
pub fn days_to_millis(days: i64) -> i64 {
    days * 24 * 60 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_date_uses_timezone() {
        // 2024-03-01 17:00 UTC = 2024-03-02 01:00 Asia/Taipei
        let millis = chrono::Utc
            .with_ymd_and_hms(2024, 3, 1, 17, 0, 0)
            .unwrap()
            .timestamp_millis();
        let tz: Tz = "Asia/Taipei".parse().unwrap();
        assert_eq!(
            business_date(millis, tz),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
        assert_eq!(business_date(millis, chrono_tz::UTC).to_string(), "2024-03-01");
    }

    #[test]
    fn test_business_day_start() {
        let tz: Tz = "Asia/Taipei".parse().unwrap();
        let millis = chrono::Utc
            .with_ymd_and_hms(2024, 3, 1, 17, 0, 0)
            .unwrap()
            .timestamp_millis();
        let start = business_day_start(millis, tz);
        // 2024-03-02 00:00 +08:00 = 2024-03-01 16:00 UTC
        let expected = chrono::Utc
            .with_ymd_and_hms(2024, 3, 1, 16, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(start, expected);
    }
}
