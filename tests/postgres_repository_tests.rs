//! Run with a disposable database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use sqlx::PgPool;

use vacancy_ingest::models::company::{Company, NewCompany};
use vacancy_ingest::models::vacancy::{NewVacancy, Vacancy};
use vacancy_ingest::repository::{IngestRepository, PgRepository, ReportRepository};

fn company(name: &str) -> NewCompany {
    NewCompany {
        name: name.to_string(),
        industry: Some("IT".to_string()),
        area: None,
    }
}

fn vacancy(title: &str, min: Option<i32>, max: Option<i32>, url: &str, company_id: i32) -> NewVacancy {
    NewVacancy {
        title: title.to_string(),
        salary_min: min,
        salary_max: max,
        url: url.to_string(),
        company_id,
    }
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap();
    n
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn upsert_company_returns_existing_id(pool: PgPool) {
    let repo = PgRepository::new(pool.clone());

    let first = repo.upsert_company(&company("Acme")).await.unwrap();
    let second = repo
        .upsert_company(&NewCompany {
            name: "Acme".to_string(),
            industry: Some("Finance".to_string()),
            area: Some("Kazan".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(count(&pool, "companies").await, 1);

    // The conflicting insert never updates the stored row.
    let stored = Company::get_by_name(&pool, "Acme").await.unwrap().unwrap();
    assert_eq!(stored.industry.as_deref(), Some("IT"));
    assert_eq!(stored.area, None);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn bulk_upsert_is_idempotent_by_url(pool: PgPool) {
    let repo = PgRepository::new(pool.clone());
    let id = repo.upsert_company(&company("Acme")).await.unwrap();
    let batch = vec![
        vacancy("Rust developer", Some(1000), Some(2000), "https://hh.ru/vacancy/1", id),
        vacancy("Intern", None, None, "https://hh.ru/vacancy/2", id),
    ];

    assert_eq!(repo.bulk_upsert_vacancies(&batch).await.unwrap(), 2);
    assert_eq!(repo.bulk_upsert_vacancies(&batch).await.unwrap(), 0);
    assert_eq!(count(&pool, "vacancies").await, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn duplicate_urls_inside_one_batch_keep_the_first(pool: PgPool) {
    let repo = PgRepository::new(pool.clone());
    let id = repo.upsert_company(&company("Acme")).await.unwrap();

    let inserted = repo
        .bulk_upsert_vacancies(&[
            vacancy("First", None, None, "Нет ссылки", id),
            vacancy("Second", None, None, "Нет ссылки", id),
        ])
        .await
        .unwrap();

    assert_eq!(inserted, 1);
    let stored = Vacancy::get_by_url(&pool, "Нет ссылки").await.unwrap().unwrap();
    assert_eq!(stored.title, "First");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn first_writer_owns_a_shared_url(pool: PgPool) {
    let repo = PgRepository::new(pool.clone());
    let first = repo.upsert_company(&company("First")).await.unwrap();
    let second = repo.upsert_company(&company("Second")).await.unwrap();
    let url = "https://hh.ru/vacancy/42";

    repo.bulk_upsert_vacancies(&[vacancy("Dev", None, Some(100), url, first)])
        .await
        .unwrap();
    repo.bulk_upsert_vacancies(&[vacancy("Dev", None, Some(200), url, second)])
        .await
        .unwrap();

    let stored = Vacancy::get_by_url(&pool, url).await.unwrap().unwrap();
    assert_eq!(stored.company_id, first);
    assert_eq!(stored.salary_max, Some(100));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn unknown_company_is_rejected(pool: PgPool) {
    let repo = PgRepository::new(pool);

    let result = repo
        .bulk_upsert_vacancies(&[vacancy("Orphan", None, None, "u", 9999)])
        .await;

    assert!(result.is_err());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn report_queries(pool: PgPool) {
    let repo = PgRepository::new(pool);
    let acme = repo.upsert_company(&company("Acme")).await.unwrap();
    let globex = repo.upsert_company(&company("Globex")).await.unwrap();
    repo.upsert_company(&company("Initech")).await.unwrap();
    repo.bulk_upsert_vacancies(&[
        vacancy("Senior Rust Engineer", Some(3000), Some(5000), "u1", acme),
        vacancy("Junior rust developer", Some(1000), None, "u2", acme),
        vacancy("Accountant", None, None, "u3", globex),
    ])
    .await
    .unwrap();

    repo.ping().await.unwrap();

    let top = repo.top_companies(10).await.unwrap();
    let ranked: Vec<_> = top.iter().map(|c| (c.name.as_str(), c.vacancies)).collect();
    assert_eq!(ranked, vec![("Acme", 2), ("Globex", 1), ("Initech", 0)]);

    assert_eq!(repo.average_salary().await.unwrap(), Some(2250.0));

    let above = repo.vacancies_above_average().await.unwrap();
    assert_eq!(above.len(), 1);
    assert_eq!(above[0].url, "u1");
    assert_eq!(above[0].company_name, "Acme");

    let found = repo.search_vacancies("RUST").await.unwrap();
    assert_eq!(found.len(), 2);

    let all = repo.all_vacancies().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].company_name, "Globex");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn average_is_none_without_salaries(pool: PgPool) {
    let repo = PgRepository::new(pool);
    let id = repo.upsert_company(&company("Acme")).await.unwrap();
    repo.bulk_upsert_vacancies(&[vacancy("Intern", None, None, "u1", id)])
        .await
        .unwrap();

    assert_eq!(repo.average_salary().await.unwrap(), None);
    assert!(repo.vacancies_above_average().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn search_treats_wildcards_literally(pool: PgPool) {
    let repo = PgRepository::new(pool);
    let id = repo.upsert_company(&company("Acme")).await.unwrap();
    repo.bulk_upsert_vacancies(&[
        vacancy("Rust developer", None, None, "u1", id),
        vacancy("Discount 50% off", None, None, "u2", id),
        vacancy("a_b tester", None, None, "u3", id),
    ])
    .await
    .unwrap();

    let urls = |rows: Vec<vacancy_ingest::models::vacancy::VacancyListing>| {
        rows.into_iter().map(|r| r.url).collect::<Vec<_>>()
    };
    assert_eq!(urls(repo.search_vacancies("_").await.unwrap()), vec!["u3"]);
    assert_eq!(urls(repo.search_vacancies("50%").await.unwrap()), vec!["u2"]);
    assert!(repo.search_vacancies(r"\").await.unwrap().is_empty());
}
