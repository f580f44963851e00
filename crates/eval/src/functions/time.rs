//! Ranges, dates and times. Relative dates count from the context's start
//! time so one pass sees one clock.

use rand::Rng;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::{debug, warn};
use vesta_core::{format_real, parse_int, parse_real, EvalContext, Value};

use super::{fixed, int_arg, text};
use crate::contract::{ArgContract, ANY_STRING, INT_RANGE, REAL_RANGE, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

static INT_PAIR: [ArgContract; 2] = [
    ArgContract::int(INT_RANGE, "from"),
    ArgContract::int(INT_RANGE, "to"),
];
static REAL_PAIR: [ArgContract; 2] = [
    ArgContract::real(REAL_RANGE, "from"),
    ArgContract::real(REAL_RANGE, "to"),
];
static DURATION_ARGS: [ArgContract; 6] = [
    ArgContract::int("0,1000", "years"),
    ArgContract::int("0,1000", "months"),
    ArgContract::int("0,1000", "days"),
    ArgContract::int("0,1000", "hours"),
    ArgContract::int("0,1000", "minutes"),
    ArgContract::int("0,40000", "seconds"),
];
static DATE_ARGS: [ArgContract; 6] = [
    ArgContract::int("1970,3000", "year"),
    ArgContract::int("1,12", "month"),
    ArgContract::int("1,31", "day"),
    ArgContract::int("0,23", "hour"),
    ArgContract::int("0,59", "minute"),
    ArgContract::int("0,59", "second"),
];
static STRFTIME_ARGS: [ArgContract; 3] = [
    ArgContract::options("gmtime,localtime", "mode"),
    ArgContract::string(ANY_STRING, "format"),
    ArgContract::int(VAL_RANGE, "epoch"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{Data, Files, System};
    use ReturnKind::{Class, Int, Scalar};

    r.register(fixed("irange", Scalar, &INT_PAIR, Data, "Ordered integer range from,to", irange));
    r.register(fixed("rrange", Scalar, &REAL_PAIR, Data, "Ordered real range from,to", rrange));
    r.register(fixed("accumulated", Int, &DURATION_ARGS, Data, "Seconds in a duration; months are 30 days, years 365", accumulated));
    r.register(fixed("ago", Int, &DURATION_ARGS, Data, "Epoch time a duration before the start of the pass", ago));
    r.register(fixed("now", Int, &[], System, "Epoch time at the start of the pass", now));
    r.register(fixed("on", Int, &DATE_ARGS, Data, "Epoch time of a UTC date", on));
    r.register(fixed("laterthan", Class, &DATE_ARGS, Files, "True if the pass started after a UTC date", laterthan));
    r.register(fixed("strftime", Scalar, &STRFTIME_ARGS, Data, "Format an epoch time", strftime_fn));
    r.register(fixed("randomint", Int, &INT_PAIR, Data, "Random integer in [from, to)", randomint));
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

fn irange(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let (Some(a), Some(b)) = (int_arg(args, 0), int_arg(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let (from, to) = ordered(a, b);
    Ok(FnCallResult::value(format!("{},{}", from, to)))
}

fn rrange(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let (Some(a), Some(b)) = (parse_real(&text(args, 0)), parse_real(&text(args, 1))) else {
        return Ok(FnCallResult::Failure);
    };
    let (from, to) = ordered(a, b);
    Ok(FnCallResult::value(format!("{},{}", format_real(from), format_real(to))))
}

// ──────────────────────────────────────────────
// Durations and dates
// ──────────────────────────────────────────────

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

fn six_ints(args: &[Value]) -> [i64; 6] {
    let mut out = [0i64; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = int_arg(args, i).unwrap_or(0);
    }
    out
}

/// Seconds in `[years, months, days, hours, minutes, seconds]`.
pub(crate) fn duration_seconds(parts: [i64; 6]) -> i64 {
    let [y, mo, d, h, mi, s] = parts;
    y * 365 * DAY + mo * 30 * DAY + d * DAY + h * HOUR + mi * MINUTE + s
}

/// Epoch seconds of a UTC calendar date, `None` if the date does not exist.
pub(crate) fn utc_epoch(parts: [i64; 6]) -> Option<i64> {
    let [y, mo, d, h, mi, s] = parts;
    let month = Month::try_from(u8::try_from(mo).ok()?).ok()?;
    let date = Date::from_calendar_date(i32::try_from(y).ok()?, month, u8::try_from(d).ok()?).ok()?;
    let time = Time::from_hms(
        u8::try_from(h).ok()?,
        u8::try_from(mi).ok()?,
        u8::try_from(s).ok()?,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

fn accumulated(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::value(duration_seconds(six_ints(args)).to_string()))
}

fn ago(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let when = (ctx.start_time() - duration_seconds(six_ints(args))).max(0);
    Ok(FnCallResult::value(when.to_string()))
}

fn now(_: &mut Evaluator, ctx: &mut EvalContext, _: &[Value]) -> CallResult {
    Ok(FnCallResult::value(ctx.start_time().to_string()))
}

fn on(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match utc_epoch(six_ints(args)) {
        Some(epoch) => Ok(FnCallResult::value(epoch.to_string())),
        None => {
            debug!(function = "on", "illegal date");
            Ok(FnCallResult::Failure)
        }
    }
}

fn laterthan(_: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    match utc_epoch(six_ints(args)) {
        Some(epoch) => Ok(FnCallResult::boolean(ctx.start_time() > epoch)),
        None => {
            debug!(function = "laterthan", "illegal date");
            Ok(FnCallResult::Failure)
        }
    }
}

fn randomint(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let (Some(a), Some(b)) = (int_arg(args, 0), int_arg(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let (from, to) = ordered(a, b);
    let n = if from == to {
        from
    } else {
        rand::thread_rng().gen_range(from..to)
    };
    Ok(FnCallResult::value(n.to_string()))
}

// ──────────────────────────────────────────────
// strftime
// ──────────────────────────────────────────────

fn strftime_fn(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let mode = text(args, 0);
    let format = text(args, 1);
    let Some(epoch) = parse_int(&text(args, 2)) else {
        return Ok(FnCallResult::value(""));
    };
    let Ok(utc) = OffsetDateTime::from_unix_timestamp(epoch) else {
        warn!(function = "strftime", epoch, "invalid time stamp");
        return Ok(FnCallResult::value(""));
    };
    let when = if mode == "localtime" {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        utc.to_offset(offset)
    } else {
        utc
    };
    Ok(FnCallResult::value(strftime(&format, when)))
}

fn twelve_hour(hour: u8) -> u8 {
    match hour % 12 {
        0 => 12,
        h => h,
    }
}

/// C `strftime` over the common conversions. Unknown conversions are
/// copied through unchanged.
pub(crate) fn strftime(format: &str, t: OffsetDateTime) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(conv) = chars.next() else {
            out.push('%');
            break;
        };
        let month = t.month().to_string();
        let weekday = t.weekday().to_string();
        let piece = match conv {
            'a' => weekday[..3].to_string(),
            'A' => weekday,
            'b' | 'h' => month[..3].to_string(),
            'B' => month,
            'c' => strftime("%a %b %e %H:%M:%S %Y", t),
            'C' => format!("{:02}", t.year() / 100),
            'd' => format!("{:02}", t.day()),
            'D' => strftime("%m/%d/%y", t),
            'e' => format!("{:>2}", t.day()),
            'F' => strftime("%Y-%m-%d", t),
            'H' => format!("{:02}", t.hour()),
            'I' => format!("{:02}", twelve_hour(t.hour())),
            'j' => format!("{:03}", t.ordinal()),
            'k' => format!("{:>2}", t.hour()),
            'l' => format!("{:>2}", twelve_hour(t.hour())),
            'm' => format!("{:02}", u8::from(t.month())),
            'M' => format!("{:02}", t.minute()),
            'n' => "\n".to_string(),
            'p' => (if t.hour() < 12 { "AM" } else { "PM" }).to_string(),
            'r' => strftime("%I:%M:%S %p", t),
            'R' => strftime("%H:%M", t),
            's' => t.unix_timestamp().to_string(),
            'S' => format!("{:02}", t.second()),
            't' => "\t".to_string(),
            'T' => strftime("%H:%M:%S", t),
            'u' => t.weekday().number_from_monday().to_string(),
            'w' => t.weekday().number_days_from_sunday().to_string(),
            'y' => format!("{:02}", t.year().rem_euclid(100)),
            'Y' => t.year().to_string(),
            'z' => {
                let (h, m, _) = t.offset().as_hms();
                let sign = if t.offset().is_negative() { '-' } else { '+' };
                format!("{}{:02}{:02}", sign, h.unsigned_abs(), m.unsigned_abs())
            }
            'Z' if t.offset().is_utc() => "UTC".to_string(),
            'Z' => strftime("%z", t),
            '%' => "%".to_string(),
            other => format!("%{}", other),
        };
        out.push_str(&piece);
    }
    out
}
