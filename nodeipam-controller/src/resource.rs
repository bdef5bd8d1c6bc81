/// Reduces a cloud resource identifier such as
/// `projects/p/global/networks/default` to its last path segment so that it
/// compares equal to the short name of the same resource.
pub fn resource_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name() {
        assert_eq!(
            resource_name("projects/testProject/global/networks/default"),
            "default"
        );
        assert_eq!(
            resource_name(
                "https://www.googleapis.com/compute/v1/projects/p/regions/us-central1/subnetworks/red"
            ),
            "red"
        );
        assert_eq!(resource_name("red"), "red");
        assert_eq!(resource_name(""), "");
        assert_eq!(resource_name("trailing/"), "");
    }
}
