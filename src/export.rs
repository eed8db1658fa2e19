use chrono::{DateTime, Local, SecondsFormat, Utc};
use log::info;
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::session::AnalysisOutcome;
use crate::store::{KeyValueStore, CODE_FIELD_COUNT};

const UTF8_BOM: &str = "\u{feff}";

/// Fields the field worker fills in next to the photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportForm {
    pub chain: String,
    pub store: String,
    pub product: String,
    pub claim_type: String,
    pub delivery_date: String,
    pub capture_date: String,
    pub comment: String,
    pub codes: [String; CODE_FIELD_COUNT],
}

/// One exported row: form fields plus the analysis comparison.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    form: ReportForm,
    code_labels: [String; CODE_FIELD_COUNT],
    outcome: AnalysisOutcome,
    exported_at: DateTime<Local>,
}

impl ReportRecord {
    pub fn new(
        form: ReportForm,
        outcome: AnalysisOutcome,
        code_labels: [String; CODE_FIELD_COUNT],
        exported_at: DateTime<Local>,
    ) -> Self {
        Self {
            form,
            code_labels,
            outcome,
            exported_at,
        }
    }

    pub fn columns(&self) -> Vec<(String, String)> {
        let form = &self.form;
        let mut columns = vec![
            ("Chain".to_string(), form.chain.clone()),
            ("Store".to_string(), form.store.clone()),
            ("Product".to_string(), form.product.clone()),
            ("Claim Type".to_string(), form.claim_type.clone()),
            ("Delivery Date".to_string(), form.delivery_date.clone()),
            ("Capture Date".to_string(), form.capture_date.clone()),
            ("Comment".to_string(), form.comment.clone()),
        ];
        columns.extend(
            self.code_labels
                .iter()
                .zip(form.codes.iter())
                .map(|(label, value)| (label.clone(), value.clone())),
        );
        columns.extend([
            (
                "Analyzed At".to_string(),
                self.outcome.analyzed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            (
                "Total Pixels".to_string(),
                self.outcome.histogram.total_sampled().to_string(),
            ),
            ("Visual Color".to_string(), self.outcome.manual_level.label()),
            ("Detected Color".to_string(), self.outcome.detected_level.label()),
            ("Result".to_string(), self.outcome.match_label().to_string()),
        ]);
        columns
    }

    /// BOM-prefixed two-line CSV (header, values) so spreadsheet apps pick UTF-8.
    pub fn to_csv(&self) -> String {
        let (headers, values): (Vec<_>, Vec<_>) = self
            .columns()
            .into_iter()
            .map(|(header, value)| (escape_csv(&header), escape_csv(&value)))
            .unzip();

        format!("{}{}\n{}", UTF8_BOM, headers.join(","), values.join(","))
    }

    /// `banana_analysis_<UTC stamp>_<chain>_<store>_Color<n>.csv`; the stamp
    /// is ISO-8601 UTC with `:` and `.` replaced by `-`.
    pub fn file_name(&self) -> String {
        let timestamp = self
            .exported_at
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!(
            "banana_analysis_{}_{}_{}_Color{}.csv",
            timestamp,
            sanitize_file_component(&self.form.chain),
            sanitize_file_component(&self.form.store),
            self.outcome.detected_level
        )
    }

    pub fn write_csv<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(self.file_name());
        std::fs::write(&path, self.to_csv())?;
        info!("Report exported to {}", path.display());
        Ok(path)
    }
}

/// Chain and store names are free text; keep them from adding path segments
/// or characters Windows refuses in file names.
fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Report mail prepared for the user's own mail client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub code: String,
    pub subject: String,
    pub body: String,
}

fn mail_count_key(user_id: &str, day: &str) -> String {
    format!("mailCount_{}_{}", user_id, day)
}

pub fn todays_mail_count<S: KeyValueStore>(store: &S, user_id: &str, now: DateTime<Local>) -> Result<u32, ExportError> {
    let key = mail_count_key(user_id, &now.format("%Y-%m-%d").to_string());
    Ok(store
        .get(&key)?
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0))
}

impl EmailDraft {
    /// Builds the draft and bumps the user's mail counter for today. The
    /// reference code is `<user><YYYYMMDD><nnn>` with `nnn` the day's sequence.
    pub fn issue<S: KeyValueStore>(
        store: &mut S,
        user_id: &str,
        form: &ReportForm,
        outcome: &AnalysisOutcome,
        now: DateTime<Local>,
    ) -> Result<Self, ExportError> {
        let sequence = todays_mail_count(store, user_id, now)? + 1;
        let key = mail_count_key(user_id, &now.format("%Y-%m-%d").to_string());
        store.set(&key, sequence.to_string())?;

        let code = format!("{}{}{:03}", user_id, now.format("%Y%m%d"), sequence);
        let subject = format!("Banana Quality Report_{}", code);
        let body = format!(
            "Banana Quality Report\n\
             \n\
             [Details]\n\
             Chain: {}\n\
             Store: {}\n\
             Analyzed At: {}\n\
             \n\
             [Result]\n\
             Visual: {}\n\
             Detected: {}\n\
             Judgement: {}\n\
             \n\
             * Please attach the CSV file and the photo.",
            form.chain,
            form.store,
            outcome.analyzed_at.format("%Y-%m-%d %H:%M:%S"),
            outcome.manual_level.label(),
            outcome.detected_level.label(),
            outcome.match_label(),
        );

        Ok(Self { code, subject, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RipenessLevel;
    use crate::sampler::{BucketCounts, SampleHistogram};
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, h, 30, 0).unwrap()
    }

    fn outcome(detected: u8, manual: u8) -> AnalysisOutcome {
        AnalysisOutcome {
            histogram: SampleHistogram::from_counts(BucketCounts {
                yellow: 900,
                speckled: 100,
                ..Default::default()
            }),
            detected_level: RipenessLevel(detected),
            manual_level: RipenessLevel(manual),
            analyzed_at: at(10),
        }
    }

    fn form() -> ReportForm {
        ReportForm {
            chain: "A-Chain".to_string(),
            store: "Main Store".to_string(),
            product: "Banana (bunch)".to_string(),
            claim_type: "Overripe".to_string(),
            delivery_date: "2026-10-17".to_string(),
            capture_date: "2026-10-18".to_string(),
            comment: "soft, \"sticky\" peel".to_string(),
            codes: ["L-1".to_string(), String::new(), "P9".to_string()],
        }
    }

    fn labels() -> [String; CODE_FIELD_COUNT] {
        ["Lot".to_string(), "Code 2".to_string(), "Pallet".to_string()]
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_csv_layout() {
        let record = ReportRecord::new(form(), outcome(7, 7), labels(), at(11));
        let csv = record.to_csv();
        assert!(csv.starts_with(UTF8_BOM));

        let mut lines = csv.trim_start_matches(UTF8_BOM).lines();
        let header = lines.next().unwrap();
        let values = lines.next().unwrap();
        assert!(lines.next().is_none());

        assert!(header.starts_with("Chain,Store,Product,Claim Type"));
        assert!(header.contains(",Lot,Code 2,Pallet,Analyzed At,"));
        assert!(header.ends_with("Visual Color,Detected Color,Result"));
        assert!(values.contains("\"soft, \"\"sticky\"\" peel\""));
        assert!(values.contains(",1000,Color 7,Color 7,Match"));
    }

    #[test]
    fn test_mismatch_result() {
        let record = ReportRecord::new(form(), outcome(6, 8), labels(), at(11));
        assert!(record.to_csv().ends_with("Color 8,Color 6,Mismatch"));
    }

    #[test]
    fn test_file_name() {
        let record = ReportRecord::new(form(), outcome(6, 6), labels(), at(11));
        let name = record.file_name();
        assert!(name.starts_with("banana_analysis_"));
        assert!(name.ends_with("_A-Chain_Main Store_Color6.csv"));
        let stamp = name.trim_start_matches("banana_analysis_");
        let stamp = &stamp[..stamp.find('_').unwrap()];
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
    }

    #[test]
    fn test_file_name_stamp_is_utc() {
        let exported_at = at(11);
        let record = ReportRecord::new(form(), outcome(6, 6), labels(), exported_at);
        let expected = exported_at
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H-%M-%S-%3fZ")
            .to_string();
        assert!(record.file_name().starts_with(&format!("banana_analysis_{}_", expected)));
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("Main Store"), "Main Store");
        assert_eq!(sanitize_file_component("Store 1/2"), "Store 1_2");
        assert_eq!(sanitize_file_component(r#"a\b:c*d?e"f<g>h|i"#), "a_b_c_d_e_f_g_h_i");
    }

    #[test]
    fn test_write_csv_with_path_characters_in_names() {
        let temp_dir = TempDir::new().unwrap();
        let export_dir = temp_dir.path().join("exports");
        let mut form = form();
        form.chain = "A/B".to_string();
        form.store = "Store 1/2".to_string();
        let record = ReportRecord::new(form, outcome(6, 6), labels(), at(11));

        assert!(record.file_name().ends_with("_A_B_Store 1_2_Color6.csv"));
        let path = record.write_csv(&export_dir).unwrap();
        assert_eq!(path.parent().unwrap(), export_dir.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_write_csv() {
        let temp_dir = TempDir::new().unwrap();
        let record = ReportRecord::new(form(), outcome(6, 6), labels(), at(11));
        let path = record.write_csv(temp_dir.path().join("exports")).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, record.to_csv());
    }

    #[test]
    fn test_email_sequence_per_day() {
        let mut store = MemoryStore::new();
        let first = EmailDraft::issue(&mut store, "u7", &form(), &outcome(5, 5), at(9)).unwrap();
        let second = EmailDraft::issue(&mut store, "u7", &form(), &outcome(5, 6), at(15)).unwrap();

        assert_eq!(first.code, "u720261018001");
        assert_eq!(second.code, "u720261018002");
        assert_eq!(second.subject, "Banana Quality Report_u720261018002");
        assert!(second.body.contains("Judgement: Mismatch"));
        assert!(second.body.contains("Store: Main Store"));
        assert_eq!(todays_mail_count(&store, "u7", at(20)).unwrap(), 2);
        assert_eq!(todays_mail_count(&store, "other", at(20)).unwrap(), 0);

        let next_day = Local.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let third = EmailDraft::issue(&mut store, "u7", &form(), &outcome(5, 5), next_day).unwrap();
        assert_eq!(third.code, "u720261019001");
    }
}
