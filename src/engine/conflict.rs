use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Bounds checks shared by every write that carries a time range.
pub(crate) fn validate_range(range: &TimeRange) -> Result<(), EngineError> {
    use crate::limits::*;
    if range.start >= range.end {
        return Err(EngineError::Validation(format!(
            "range start {} must be before end {}",
            range.start, range.end
        )));
    }
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking duration too long"));
    }
    Ok(())
}

/// Availability and listing windows get a wider duration cap than bookings.
pub(crate) fn validate_query_window(range: &TimeRange) -> Result<(), EngineError> {
    use crate::limits::*;
    if range.start >= range.end {
        return Err(EngineError::Validation(format!(
            "query start {} must be before end {}",
            range.start, range.end
        )));
    }
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn ensure_len(
    value: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), EngineError> {
    match value {
        Some(s) if s.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

/// Full input validation for a booking request.
pub(crate) fn validate_new_booking(req: &NewBooking) -> Result<(), EngineError> {
    use crate::limits::*;
    validate_range(&req.range)?;
    ensure_len(req.service_type.as_deref(), MAX_SERVICE_TYPE_LEN, "service type too long")?;
    ensure_len(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
    ensure_len(req.location.as_deref(), MAX_LOCATION_LEN, "location too long")?;
    Ok(())
}
