//! Sort directives

/// A single sort directive. Directives serialize in declaration order; the
/// datastore breaks ties by the order they appear in the parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// `field` ascending, `-field` descending.
    pub fn to_segment(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        assert_eq!(OrderBy::asc("last_name").to_segment(), "last_name");
        assert_eq!(OrderBy::desc("created_at").to_segment(), "-created_at");
    }
}
