/// Query parameters accepted by the list and realtime endpoints.
///
/// `page` and `limit` are kept as raw text: anything that is not a positive
/// integer falls back to the defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessFilter {
    pub state: Option<String>,
    pub user: Option<String>,
    /// Substring matched against user or command
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ProcessFilter {
    /// Builds a filter from decoded query pairs. Unknown keys are ignored and
    /// a repeated key keeps its first value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "state" => &mut filter.state,
                "user" => &mut filter.user,
                "search" => &mut filter.search,
                "page" => &mut filter.page,
                "limit" => &mut filter.limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        filter
    }

    pub fn state(&self) -> Option<&str> {
        non_empty(&self.state)
    }

    pub fn user(&self) -> Option<&str> {
        non_empty(&self.user)
    }

    pub fn search(&self) -> Option<&str> {
        non_empty(&self.search)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
