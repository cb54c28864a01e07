use crate::programs::{
    Category, EducationLevel, Eligibility, EmploymentStatus, Gender, MaritalStatus, OperatingEntityType, Program,
};
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::ErrorKind, path::Path, sync::Arc, time::Instant};

const CSV_HEADERS: [&str; 27] = [
    "id",
    "uuid",
    "category",
    "title",
    "summary",
    "details",
    "preview",
    "operating_entity",
    "operating_entity_type",
    "application_method",
    "apply_url",
    "reference_url",
    "min_age",
    "max_age",
    "min_household",
    "max_household",
    "min_income",
    "max_income",
    "region",
    "gender",
    "marital_status",
    "education",
    "employment",
    "apply_start_at",
    "apply_end_at",
    "created_at",
    "example",
];

/// One row of programs.csv.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub id: u64,
    pub uuid: String,
    pub category: Category,
    pub title: String,
    pub summary: String,
    pub details: String,
    pub preview: String,
    pub operating_entity: String,
    pub operating_entity_type: OperatingEntityType,
    pub application_method: Option<String>,
    pub apply_url: Option<String>,
    pub reference_url: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub min_household: Option<u32>,
    pub max_household: Option<u32>,
    pub min_income: Option<u64>,
    pub max_income: Option<u64>,
    pub region: Option<String>,
    pub gender: Option<Gender>,
    pub marital_status: Option<MaritalStatus>,
    pub education: Option<EducationLevel>,
    pub employment: Option<EmploymentStatus>,
    pub apply_start_at: Option<DateTime<Utc>>,
    pub apply_end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub example: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<ProgramRecord> for Program {
    fn from(r: ProgramRecord) -> Self {
        Program {
            id: r.id,
            uuid: r.uuid,
            category: r.category,
            title: r.title,
            summary: r.summary,
            details: r.details,
            preview: r.preview,
            operating_entity: r.operating_entity,
            operating_entity_type: r.operating_entity_type,
            application_method: non_blank(r.application_method),
            apply_url: non_blank(r.apply_url),
            reference_url: non_blank(r.reference_url),
            eligibility: Eligibility {
                min_age: r.min_age,
                max_age: r.max_age,
                min_household: r.min_household,
                max_household: r.max_household,
                min_income: r.min_income,
                max_income: r.max_income,
                region: non_blank(r.region),
                gender: r.gender,
                marital_status: r.marital_status,
                education: r.education,
                employment: r.employment,
            },
            apply_start_at: r.apply_start_at,
            apply_end_at: r.apply_end_at,
            created_at: r.created_at,
        }
    }
}

/// Read-only set of programs, shared between request handlers.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: Arc<Vec<Program>>,
    by_id: Arc<HashMap<u64, usize>>,
    examples: Arc<Vec<u64>>,
}

impl ProgramCatalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new program catalog at {}", path.display());
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut programs = vec![];
        let mut examples = vec![];
        for (idx, record) in csv_reader.deserialize::<ProgramRecord>().enumerate() {
            let record = record.map_err(|e| anyhow::anyhow!("programs.csv row {}: {e}", idx + 1))?;
            if record.example {
                examples.push(record.id);
            }
            programs.push(Program::from(record));
        }

        let catalog = Self::new(programs, examples)?;

        log::info!(
            "loaded {} programs ({} examples) in {:?}",
            catalog.len(),
            catalog.examples.len(),
            now.elapsed()
        );

        Ok(catalog)
    }

    pub fn new(programs: Vec<Program>, mut examples: Vec<u64>) -> anyhow::Result<Self> {
        let mut by_id = HashMap::with_capacity(programs.len());
        for (idx, program) in programs.iter().enumerate() {
            if by_id.insert(program.id, idx).is_some() {
                bail!("duplicate program id {}", program.id);
            }
        }

        for id in &examples {
            if !by_id.contains_key(id) {
                bail!("example program {id} is not in the catalog");
            }
        }
        examples.sort_unstable();
        examples.dedup();

        Ok(Self {
            programs: Arc::new(programs),
            by_id: Arc::new(by_id),
            examples: Arc::new(examples),
        })
    }

    pub fn get(&self, id: u64) -> Option<&Program> {
        self.by_id.get(&id).map(|idx| &self.programs[*idx])
    }

    pub fn all(&self) -> &[Program] {
        &self.programs
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn example_ids(&self) -> &[u64] {
        &self.examples
    }

    pub fn is_example(&self, id: u64) -> bool {
        self.examples.binary_search(&id).is_ok()
    }

    pub fn examples(&self) -> impl Iterator<Item = &Program> {
        self.examples.iter().filter_map(|id| self.get(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "id,uuid,category,title,summary,details,preview,operating_entity,operating_entity_type,\
application_method,apply_url,reference_url,min_age,max_age,min_household,max_household,min_income,max_income,\
region,gender,marital_status,education,employment,apply_start_at,apply_end_at,created_at,example";

    #[test]
    fn test_load_creates_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.csv");

        let catalog = ProgramCatalog::load(&path).unwrap();
        assert!(catalog.is_empty());

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim(), HEADER);
    }

    #[test]
    fn test_load_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(
            file,
            "1,u-1,CASH,Basic pension,summary,details,preview,Ministry,CENTRAL,,,,65,,,,,,,ANY,,,,,2025-12-31T00:00:00Z,2025-01-01T00:00:00Z,true"
        )
        .unwrap();
        writeln!(
            file,
            "2,u-2,housing,Rent help,s,d,p,City,LOCAL,online,https://apply.example,,,,,,,,서울,,,,UNEMPLOYED,,,2025-02-01T00:00:00Z,false"
        )
        .unwrap();
        drop(file);

        let catalog = ProgramCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.example_ids(), &[1]);
        assert!(catalog.is_example(1));
        assert!(!catalog.is_example(2));

        let pension = catalog.get(1).unwrap();
        assert_eq!(pension.category, Category::Cash);
        assert_eq!(pension.eligibility.min_age, Some(65));
        assert_eq!(pension.eligibility.gender, Some(Gender::Any));
        assert!(pension.apply_end_at.is_some());
        assert_eq!(pension.application_method, None);

        let rent = catalog.get(2).unwrap();
        assert_eq!(rent.category, Category::Housing);
        assert_eq!(rent.application_method.as_deref(), Some("online"));
        assert_eq!(rent.eligibility.region.as_deref(), Some("서울"));
        assert_eq!(rent.eligibility.employment, Some(EmploymentStatus::Unemployed));
    }

    #[test]
    fn test_bad_category_reports_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.csv");
        std::fs::write(
            &path,
            format!("{HEADER}\n1,u-1,PENSION,t,s,d,p,M,CENTRAL,,,,,,,,,,,,,,,,,2025-01-01T00:00:00Z,false\n"),
        )
        .unwrap();

        let err = ProgramCatalog::load(&path).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
