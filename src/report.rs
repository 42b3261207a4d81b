use std::io::Write;

use crate::config::ReportKind;
use crate::models::vacancy::VacancyListing;
use crate::repository::ReportRepository;

/// Run one report and write it line by line to `out`.
pub async fn write_report<W, R>(repo: &R, kind: &ReportKind, out: &mut W) -> anyhow::Result<()>
where
    W: Write,
    R: ReportRepository + ?Sized,
{
    match kind {
        ReportKind::TopCompanies { limit } => {
            let companies = repo.top_companies((*limit).max(1)).await?;
            for company in &companies {
                writeln!(out, "- {}: {} vacancies", company.name, company.vacancies)?;
            }
            writeln!(out, "Companies: {}", companies.len())?;
        }
        ReportKind::Vacancies => {
            let vacancies = repo.all_vacancies().await?;
            write_listings(out, &vacancies)?;
            writeln!(out, "Total vacancies: {}", vacancies.len())?;
        }
        ReportKind::AverageSalary => match repo.average_salary().await? {
            Some(avg) => writeln!(out, "Average salary: {avg:.2}")?,
            None => writeln!(out, "Average salary: no vacancies with a salary")?,
        },
        ReportKind::AboveAverage => {
            let vacancies = repo.vacancies_above_average().await?;
            write_listings(out, &vacancies)?;
            writeln!(out, "Vacancies above average salary: {}", vacancies.len())?;
        }
        ReportKind::Search { keyword } => {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                anyhow::bail!("keyword must not be empty");
            }
            let vacancies = repo.search_vacancies(keyword).await?;
            write_listings(out, &vacancies)?;
            writeln!(
                out,
                "Vacancies containing '{keyword}': {}",
                vacancies.len()
            )?;
        }
    }
    Ok(())
}

fn write_listings<W: Write>(out: &mut W, vacancies: &[VacancyListing]) -> std::io::Result<()> {
    for v in vacancies {
        writeln!(
            out,
            "  - {} ({}), from {} to {}, link: {}",
            v.title,
            v.company_name,
            bound(v.salary_min),
            bound(v.salary_max),
            v.url
        )?;
    }
    Ok(())
}

fn bound(value: Option<i32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}
