use chrono::NaiveDate;

const RECORD_NAME_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a record file name in focuslog.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format(RECORD_NAME_FORMAT).to_string()
}

/// Inverse of [date_to_record_name]. Anything else found in the record directory is `None`.
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, RECORD_NAME_FORMAT).ok()
}
