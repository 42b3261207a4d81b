use crate::collectors::{PageSource, RawVacancy};
use crate::error::FetchError;

/// How a paginated fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A short page was seen, or the page budget ran out.
    Complete,
    /// Page `page` answered with a status other than 200; earlier pages are kept.
    Truncated { status: u16, page: u32 },
}

/// Everything fetched for one employer, in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyVacancies {
    pub items: Vec<RawVacancy>,
    pub completion: Completion,
}

impl CompanyVacancies {
    pub fn is_truncated(&self) -> bool {
        matches!(self.completion, Completion::Truncated { .. })
    }
}

/// Walk pages `0..max_pages` in order until a short page.
///
/// A status other than 200 ends the walk with [`Completion::Truncated`] and the
/// pages gathered so far. Request and decode failures abort the whole fetch.
pub async fn fetch_all<S>(
    source: &S,
    employer_id: Option<&str>,
    max_pages: u32,
    per_page: u32,
) -> Result<CompanyVacancies, FetchError>
where
    S: PageSource + ?Sized,
{
    let mut items = Vec::new();

    for page in 0..max_pages {
        match source.fetch_page(employer_id, page, per_page).await {
            Ok(fetched) => {
                items.extend(fetched.items);
                if fetched.is_last {
                    break;
                }
            }
            Err(FetchError::Transport { status }) => {
                return Ok(CompanyVacancies {
                    items,
                    completion: Completion::Truncated { status, page },
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(CompanyVacancies {
        items,
        completion: Completion::Complete,
    })
}
