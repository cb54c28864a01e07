
use std::sync::Arc;

use chrono::DateTime;

use crate::{
    app::service::ProgramService,
    catalog::ProgramCatalog,
    config::Config,
    embedding::{MemoryStore, Similarity},
    programs::{Category, Eligibility, OperatingEntityType, Program},
    users::UserStore,
};

pub fn program(id: u64, category: Category, title: &str, created: i64) -> Program {
    Program {
        id,
        uuid: format!("00000000-0000-0000-0000-{id:012}"),
        category,
        title: title.to_string(),
        summary: format!("{title} summary"),
        details: String::new(),
        preview: String::new(),
        operating_entity: "Ministry of Health and Welfare".to_string(),
        operating_entity_type: OperatingEntityType::Central,
        application_method: None,
        apply_url: None,
        reference_url: None,
        eligibility: Eligibility::default(),
        apply_start_at: None,
        apply_end_at: None,
        created_at: DateTime::from_timestamp(created, 0).unwrap(),
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.ranking.dimensions = 2;
    config.ranking.similarity = Similarity::Dot;
    config
}

/// Service over an in-memory catalog, 2-d embeddings and user store.
pub fn create_service(programs: Vec<Program>, vectors: &[(u64, [f32; 2])], examples: Vec<u64>) -> ProgramService {
    create_service_with_users(programs, vectors, examples, UserStore::in_memory())
}

pub fn create_service_with_users(
    programs: Vec<Program>,
    vectors: &[(u64, [f32; 2])],
    examples: Vec<u64>,
    users: UserStore,
) -> ProgramService {
    let config = test_config();

    let store = MemoryStore::empty(2, Similarity::Dot);
    for (id, v) in vectors {
        store.insert(*id, v.to_vec()).unwrap();
    }

    let catalog = ProgramCatalog::new(programs, examples).unwrap();
    ProgramService::new(&config, catalog, Arc::new(store), users)
}

/// 2 CASH, 1 HEALTH, 2 EMPLOYMENT, 1 HOUSING.
pub fn sample_programs() -> Vec<Program> {
    vec![
        program(1, Category::Cash, "Basic livelihood allowance", 100),
        program(2, Category::Cash, "Emergency living support", 200),
        program(3, Category::Health, "Free health checkup", 300),
        program(4, Category::Employment, "Senior Employment program", 400),
        program(5, Category::Employment, "Employment success package", 500),
        program(6, Category::Housing, "Housing repair voucher", 600),
    ]
}

pub fn sample_service() -> ProgramService {
    create_service(
        sample_programs(),
        &[
            (1, [1.0, 0.0]),
            (2, [0.8, 0.6]),
            (3, [0.0, 1.0]),
            (4, [0.6, 0.8]),
            (5, [-1.0, 0.0]),
            (6, [0.0, -1.0]),
        ],
        vec![1, 3],
    )
}
