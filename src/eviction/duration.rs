use chrono::Duration;

/// Parse an ISO-8601 duration (`P90D`, `PT1H`, `P1DT2H3M4S`, `P2W`).
///
/// Years and months are rejected: a retention cutoff needs an exact
/// length, and calendar units don't have one.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration, String> {
    let err = || format!("invalid ISO-8601 duration: {}", input);

    let rest = input.strip_prefix('P').ok_or_else(err)?;
    if rest.is_empty() {
        return Err(err());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return Err(err());
            }
            (d, Some(t))
        }
        None => (rest, None),
    };

    let mut total = Duration::zero();
    let mut matched = false;

    let mut number = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: i64 = number.parse().map_err(|_| err())?;
        number.clear();
        matched = true;
        total += match c {
            'W' => Duration::weeks(value),
            'D' => Duration::days(value),
            'Y' | 'M' => return Err(format!(
                "calendar units (Y/M) are not supported in retention periods: {}",
                input
            )),
            _ => return Err(err()),
        };
    }
    if !number.is_empty() {
        return Err(err());
    }

    if let Some(time_part) = time_part {
        for c in time_part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let value: i64 = number.parse().map_err(|_| err())?;
            number.clear();
            matched = true;
            total += match c {
                'H' => Duration::hours(value),
                'M' => Duration::minutes(value),
                'S' => Duration::seconds(value),
                _ => return Err(err()),
            };
        }
        if !number.is_empty() {
            return Err(err());
        }
    }

    if !matched {
        return Err(err());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_day_durations() {
        assert_eq!(parse_iso8601_duration("P90D").unwrap(), Duration::days(90));
        assert_eq!(parse_iso8601_duration("P2W").unwrap(), Duration::weeks(2));
    }

    #[test]
    fn parses_time_durations() {
        assert_eq!(parse_iso8601_duration("PT1H").unwrap(), Duration::hours(1));
        assert_eq!(
            parse_iso8601_duration("P1DT2H3M4S").unwrap(),
            Duration::days(1) + Duration::hours(2) + Duration::minutes(3) + Duration::seconds(4)
        );
    }

    #[test]
    fn minutes_are_time_scoped() {
        // M before T would be months, which are rejected.
        assert!(parse_iso8601_duration("P3M").is_err());
        assert_eq!(
            parse_iso8601_duration("PT3M").unwrap(),
            Duration::minutes(3)
        );
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "P", "PT", "90D", "P90", "P90X", "PD", "P1Y"] {
            assert!(parse_iso8601_duration(bad).is_err(), "{} should fail", bad);
        }
    }
}
