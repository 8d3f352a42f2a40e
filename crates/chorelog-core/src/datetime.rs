use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

use crate::config::Config;

const TIMEZONE_ENV_VAR: &str =
  "CHORELOG_TIMEZONE";

const MILLIS_PER_DAY: i64 =
  24 * 60 * 60 * 1000;

/// Divisor for the "N weeks ago"
/// bucket.
pub const DAYS_PER_WEEK: i64 = 7;
/// Fixed-length month used by
/// relative formatting; not calendar
/// aware.
pub const DAYS_PER_MONTH: i64 = 30;
/// Fixed-length year used by relative
/// formatting; not calendar aware.
pub const DAYS_PER_YEAR: i64 = 365;

/// Whole days elapsed between
/// `timestamp` and `now`, floored.
/// Negative when `timestamp` lies in
/// the future.
#[must_use]
pub fn days_since(
  timestamp: DateTime<Utc>,
  now: DateTime<Utc>
) -> i64 {
  (now - timestamp)
    .num_milliseconds()
    .div_euclid(MILLIS_PER_DAY)
}

/// "Jan 10, 2026"
#[must_use]
pub fn format_absolute_date(
  timestamp: DateTime<Utc>,
  tz: &Tz
) -> String {
  timestamp
    .with_timezone(tz)
    .format("%b %-d, %Y")
    .to_string()
}

/// "7PM Sat 1/10/26"
#[must_use]
pub fn format_date_time(
  timestamp: DateTime<Utc>,
  tz: &Tz
) -> String {
  timestamp
    .with_timezone(tz)
    .format("%-I%p %a %-m/%-d/%y")
    .to_string()
}

/// Same shape `parse_date_expr`
/// accepts for local date-times.
#[must_use]
pub fn format_input_datetime(
  timestamp: DateTime<Utc>,
  tz: &Tz
) -> String {
  timestamp
    .with_timezone(tz)
    .format("%Y-%m-%dT%H:%M")
    .to_string()
}

#[must_use]
pub fn format_relative(
  timestamp: DateTime<Utc>,
  now: DateTime<Utc>
) -> String {
  let days = days_since(timestamp, now);

  // Future timestamps read as today.
  if days <= 0 {
    return "Today".to_string();
  }
  if days == 1 {
    return "Yesterday".to_string();
  }
  if days < DAYS_PER_WEEK {
    return format!("{days} days ago");
  }
  if days < DAYS_PER_MONTH {
    return plural_ago(
      days / DAYS_PER_WEEK,
      "week"
    );
  }
  if days < DAYS_PER_YEAR {
    return plural_ago(
      days / DAYS_PER_MONTH,
      "month"
    );
  }
  plural_ago(
    days / DAYS_PER_YEAR,
    "year"
  )
}

fn plural_ago(
  count: i64,
  unit: &str
) -> String {
  if count == 1 {
    format!("1 {unit} ago")
  } else {
    format!("{count} {unit}s ago")
  }
}

#[must_use]
pub fn interval_label(
  days: Option<u32>
) -> String {
  match days {
    | None | Some(0) => {
      "No interval".to_string()
    }
    | Some(7) => "Every week".to_string(),
    | Some(14) => {
      "Every 2 weeks".to_string()
    }
    | Some(30) => {
      "Every month".to_string()
    }
    | Some(60) => {
      "Every 2 months".to_string()
    }
    | Some(90) => {
      "Every 3 months".to_string()
    }
    | Some(180) => {
      "Every 6 months".to_string()
    }
    | Some(365) => {
      "Every year".to_string()
    }
    | Some(other) => {
      format!("Every {other} days")
    }
  }
}

/// Picks the display timezone:
/// `CHORELOG_TIMEZONE`, then the
/// `timezone` config key, then UTC.
#[tracing::instrument(skip(cfg))]
pub fn resolve_timezone(
  cfg: &Config
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = cfg.get("timezone")
    && let Some(tz) =
      parse_timezone(&raw, "config")
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in timezone {}: \
         {context}",
        tz.name()
      ))
    }
  }
}

fn local_midnight(
  date: NaiveDate,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {context}"
      )
    })?;
  to_utc_from_local(
    midnight, tz, context
  )
}

/// Parses a user-entered point in
/// time, typically the moment a chore
/// was done.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      let date = now
        .with_timezone(tz)
        .date_naive();
      return local_midnight(
        date, tz, "today"
      );
    }
    | "yesterday" => {
      let date = now
        .with_timezone(tz)
        .date_naive()
        .pred_opt()
        .ok_or_else(|| {
          anyhow!(
            "no calendar day before {now}"
          )
        })?;
      return local_midnight(
        date,
        tz,
        "yesterday"
      );
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | "m" => Duration::try_minutes(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    })?;

    let shifted = if sign == "-" {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    });
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      compact_date_serde::FORMAT
    )
  {
    return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return local_midnight(
      date, tz, "date"
    );
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, fmt
      );
    }
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let local_now =
      now.with_timezone(tz);
    let mut day =
      local_now.date_naive();
    let today_candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if today_candidate
      > local_now.naive_local()
    {
      day = day
        .checked_sub_signed(
          Duration::days(1)
        )
        .ok_or_else(|| {
          anyhow!(
            "failed to step back to \
             previous day"
          )
        })?;
    }
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time"
        )
      })?;
    return to_utc_from_local(
      candidate,
      tz,
      "clock-time"
    );
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/yesterday, \
     -Nd/-Nh/-Nm (or +), clock times \
     (e.g. 7pm, 7:30pm or 19:30), \
     RFC3339, YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM, \
     YYYYMMDDTHHMMSSZ"
  })
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  let Some(ampm_match) =
    captures.name("ampm")
  else {
    // A bare number is not a time.
    captures.name("minute")?;
    if raw_hour > 23 {
      return None;
    }
    return Some((raw_hour, minute));
  };

  if raw_hour == 0 || raw_hour > 12 {
    return None;
  }
  let hour = match ampm_match
    .as_str()
    .to_ascii_lowercase()
    .as_str()
  {
    | "am" => raw_hour % 12,
    | "pm" => raw_hour % 12 + 12,
    | _ => return None
  };

  Some((hour, minute))
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::*;

  fn at(
    y: i32,
    mo: u32,
    d: u32,
    h: u32,
    mi: u32
  ) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(y, mo, d, h, mi, 0)
      .single()
      .expect("valid timestamp")
  }

  #[test]
  fn days_since_truncates_partial_days() {
    let now = at(2026, 1, 10, 12, 0);
    assert_eq!(
      days_since(
        now - Duration::hours(23),
        now
      ),
      0
    );
    assert_eq!(
      days_since(
        now - Duration::hours(47),
        now
      ),
      1
    );
    assert_eq!(
      days_since(
        now + Duration::hours(1),
        now
      ),
      -1
    );
  }

  #[test]
  fn days_since_never_decreases_as_now_advances()
  {
    let done = at(2025, 12, 1, 8, 30);
    let mut previous = i64::MIN;
    for step in 0..200 {
      let now =
        done + Duration::hours(7 * step);
      let days = days_since(done, now);
      assert!(days >= previous);
      previous = days;
    }
  }

  #[test]
  fn relative_buckets() {
    let now = at(2026, 1, 10, 12, 0);
    let cases = [
      (0, "Today"),
      (1, "Yesterday"),
      (2, "2 days ago"),
      (3, "3 days ago"),
      (6, "6 days ago"),
      (7, "1 week ago"),
      (10, "1 week ago"),
      (13, "1 week ago"),
      (14, "2 weeks ago"),
      (21, "3 weeks ago"),
      (29, "4 weeks ago"),
      (30, "1 month ago"),
      (40, "1 month ago"),
      (75, "2 months ago"),
      (364, "12 months ago"),
      (365, "1 year ago"),
      (400, "1 year ago"),
      (729, "1 year ago"),
      (730, "2 years ago"),
      (800, "2 years ago")
    ];
    for (days, expected) in cases {
      assert_eq!(
        format_relative(
          now - Duration::days(days),
          now
        ),
        expected,
        "days={days}"
      );
    }
  }

  #[test]
  fn relative_future_reads_as_today() {
    let now = at(2026, 1, 10, 12, 0);
    assert_eq!(
      format_relative(
        now + Duration::days(2),
        now
      ),
      "Today"
    );
  }

  #[test]
  fn interval_labels() {
    assert_eq!(
      interval_label(Some(14)),
      "Every 2 weeks"
    );
    assert_eq!(
      interval_label(Some(45)),
      "Every 45 days"
    );
    assert_eq!(
      interval_label(None),
      "No interval"
    );
    assert_eq!(
      interval_label(Some(0)),
      "No interval"
    );
    assert_eq!(
      interval_label(Some(365)),
      "Every year"
    );
  }

  #[test]
  fn interval_labels_for_named_periods()
  {
    let cases = [
      (7, "Every week"),
      (30, "Every month"),
      (60, "Every 2 months"),
      (90, "Every 3 months"),
      (180, "Every 6 months")
    ];
    for (days, expected) in cases {
      assert_eq!(
        interval_label(Some(days)),
        expected,
        "days={days}"
      );
    }
  }

  #[test]
  fn absolute_and_compact_formats() {
    let ts = at(2026, 1, 10, 19, 5);
    assert_eq!(
      format_absolute_date(
        ts,
        &chrono_tz::UTC
      ),
      "Jan 10, 2026"
    );
    assert_eq!(
      format_date_time(
        ts,
        &chrono_tz::UTC
      ),
      "7PM Sat 1/10/26"
    );
    assert_eq!(
      format_input_datetime(
        ts,
        &chrono_tz::UTC
      ),
      "2026-01-10T19:05"
    );
  }

  #[test]
  fn absolute_date_uses_given_timezone() {
    let tz: Tz = "America/New_York"
      .parse()
      .expect("known tz");
    let ts = at(2026, 1, 11, 2, 0);
    assert_eq!(
      format_absolute_date(ts, &tz),
      "Jan 10, 2026"
    );
  }

  #[test]
  fn parses_relative_and_keywords() {
    let now = at(2026, 1, 10, 15, 0);
    let tz = chrono_tz::UTC;
    assert_eq!(
      parse_date_expr("-3d", now, &tz)
        .expect("relative"),
      now - Duration::days(3)
    );
    assert_eq!(
      parse_date_expr(
        "yesterday",
        now,
        &tz
      )
      .expect("yesterday"),
      at(2026, 1, 9, 0, 0)
    );
    assert_eq!(
      parse_date_expr(
        "2025-12-24",
        now,
        &tz
      )
      .expect("date"),
      at(2025, 12, 24, 0, 0)
    );
    assert_eq!(
      parse_date_expr(
        "2025-12-24T08:15",
        now,
        &tz
      )
      .expect("datetime"),
      at(2025, 12, 24, 8, 15)
    );
  }

  #[test]
  fn yesterday_is_previous_local_midnight_across_dst()
  {
    let tz: Tz = "America/New_York"
      .parse()
      .expect("known tz");
    // Clocks sprang forward on 2026-03-08.
    let now = at(2026, 3, 9, 15, 0);
    let yesterday = parse_date_expr(
      "yesterday",
      now,
      &tz
    )
    .expect("yesterday")
    .with_timezone(&tz);
    assert_eq!(
      yesterday
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-03-08 00:00"
    );
  }

  #[test]
  fn clock_time_resolves_to_most_recent_past() {
    let now = at(2026, 1, 10, 15, 0);
    let tz = chrono_tz::UTC;
    assert_eq!(
      parse_date_expr("9am", now, &tz)
        .expect("morning"),
      at(2026, 1, 10, 9, 0)
    );
    assert_eq!(
      parse_date_expr("7:30pm", now, &tz)
        .expect("evening"),
      at(2026, 1, 9, 19, 30)
    );
    assert_eq!(
      parse_date_expr("12am", now, &tz)
        .expect("midnight"),
      at(2026, 1, 10, 0, 0)
    );
  }

  #[test]
  fn huge_offsets_error_instead_of_panicking() {
    let now = at(2026, 1, 10, 15, 0);
    assert!(
      parse_date_expr(
        "-99999999999999d",
        now,
        &chrono_tz::UTC
      )
      .is_err()
    );
  }

  #[test]
  fn rejects_garbage_and_bare_numbers() {
    let now = at(2026, 1, 10, 15, 0);
    let tz = chrono_tz::UTC;
    assert!(
      parse_date_expr("soonish", now, &tz)
        .is_err()
    );
    assert!(
      parse_date_expr("7", now, &tz)
        .is_err()
    );
  }
}

pub mod compact_date_serde {
  use chrono::{
    DateTime,
    NaiveDateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub const FORMAT: &str =
    "%Y%m%dT%H%M%SZ";

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::{
      DateTime,
      NaiveDateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    use super::FORMAT;

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
                Some(raw) => NaiveDateTime::parse_from_str(&raw, FORMAT)
                    .map(|ndt| Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc)))
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
    }
  }
}
