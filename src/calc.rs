use serde::Serialize;

/// Rounds to two decimals, ties to even: 3.125 -> 3.12, 9.375 -> 9.38.
pub fn round_off_2_decimal(x: f64) -> f64 {
    let scaled = 100.0 * x;
    let floor = scaled.floor();
    let rounded = match (scaled - floor).partial_cmp(&0.5) {
        Some(std::cmp::Ordering::Less) => floor,
        Some(std::cmp::Ordering::Greater) => floor + 1.0,
        _ if floor % 2.0 == 0.0 => floor,
        _ => floor + 1.0,
    };
    rounded / 100.0
}

/// `presents / total` as a percentage; a student with no recorded classes scores 0.
pub fn attendance_percentage(presents: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round_off_2_decimal(presents as f64 / total as f64 * 100.0)
}

/// Per-student counts for one class and month, as read from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTally {
    pub enrollment_number: String,
    pub name: String,
    pub total: i64,
    pub presents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub enrollment_number: String,
    pub name: String,
    pub total_classes: i64,
    pub presents: i64,
    pub absents: i64,
    pub percentage: f64,
}

/// Sorted by enrollment number ascending.
pub fn summarize(tallies: Vec<StudentTally>) -> Vec<SummaryRow> {
    let mut rows: Vec<SummaryRow> = tallies
        .into_iter()
        .map(|t| SummaryRow {
            absents: t.total - t.presents,
            percentage: attendance_percentage(t.presents, t.total),
            total_classes: t.total,
            presents: t.presents,
            enrollment_number: t.enrollment_number,
            name: t.name,
        })
        .collect();
    rows.sort_by(|a, b| a.enrollment_number.cmp(&b.enrollment_number));
    rows
}
