use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl Repository {
    pub fn new(owner: String, name: String) -> Self {
        Self {
            owner,
            name,
            branch: "main".to_string(),
        }
    }

    /// Parse an `owner/name` pair.
    pub fn parse(full_name: &str) -> crate::Result<Self> {
        match full_name.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner.to_string(), name.to_string()))
            }
            _ => Err(crate::Error::InvalidRepository(full_name.to_string())),
        }
    }

    pub fn with_branch(mut self, branch: String) -> Self {
        self.branch = branch;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn actions_url(&self) -> String {
        format!("https://github.com/{}/{}/actions", self.owner, self.name)
    }

    pub fn run_url(&self, run_id: u64) -> String {
        format!("{}/runs/{}", self.actions_url(), run_id)
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_main() {
        let repo = Repository::parse(" myorg/web-e2e ").unwrap();
        assert_eq!((repo.owner.as_str(), repo.name.as_str()), ("myorg", "web-e2e"));
        assert_eq!(repo.branch, "main");
        assert_eq!(repo.to_string(), "myorg/web-e2e");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for bad in ["no-slash", "/name", "owner/", "a/b/c"] {
            assert!(Repository::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_run_url_on_release_branch() {
        let repo = Repository::parse("myorg/mobile-tests")
            .unwrap()
            .with_branch("release/2.4".to_string());
        assert_eq!(repo.branch, "release/2.4");
        assert_eq!(
            repo.run_url(42),
            "https://github.com/myorg/mobile-tests/actions/runs/42"
        );
    }
}
