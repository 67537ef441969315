use std::io::Read;

/// One parsed row of a lead roster export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
}

/// Parsed roster plus the number of rows dropped for missing/invalid email.
#[derive(Debug, Default)]
pub struct RosterImport {
    pub rows: Vec<RosterRow>,
    pub skipped: usize,
}

/// Error raised while reading a roster export.
#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to read roster: {0}")]
    Csv(#[from] csv::Error),
    #[error("roster has no email column")]
    MissingEmailColumn,
}

/// Parse a CSV lead roster. CRM exports disagree on header names, so the
/// email/name/company columns are located case-insensitively; rows without
/// a plausible email are counted and skipped, never fatal.
pub fn read_roster<R: Read>(reader: R) -> Result<RosterImport, RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let email_column = find_column(&headers, &["email", "email address", "e-mail"])
        .ok_or(RosterImportError::MissingEmailColumn)?;
    let first_name_column = find_column(&headers, &["first_name", "first name", "firstname"]);
    let last_name_column = find_column(&headers, &["last_name", "last name", "lastname"]);
    let company_column = find_column(&headers, &["company", "company name", "organization"]);

    let mut import = RosterImport::default();
    for record in csv_reader.records() {
        let record = record?;
        let email = record.get(email_column).unwrap_or_default().trim();
        if !email.contains('@') {
            import.skipped += 1;
            continue;
        }

        import.rows.push(RosterRow {
            email: email.to_string(),
            first_name: field(&record, first_name_column),
            last_name: field(&record, last_name_column),
            company: field(&record, company_column),
        });
    }

    Ok(import)
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim().to_ascii_lowercase();
        names.contains(&header.as_str())
    })
}

fn field(record: &csv::StringRecord, column: Option<usize>) -> String {
    column
        .and_then(|index| record.get(index))
        .unwrap_or_default()
        .trim()
        .to_string()
}
