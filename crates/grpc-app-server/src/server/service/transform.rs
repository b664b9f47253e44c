/// Produces the response text for one received unit.
///
/// Total and deterministic; any input string, including the empty string, is
/// valid. This is the service's single (placeholder) business rule.
pub fn transform(text: &str) -> String {
    format!("response from grpc-app: you sent {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_the_input() {
        assert_eq!(transform("test"), "response from grpc-app: you sent test");
    }

    #[test]
    fn accepts_the_empty_string() {
        assert_eq!(transform(""), "response from grpc-app: you sent ");
    }

    #[test]
    fn passes_unicode_through_unchanged() {
        assert_eq!(
            transform("héllo wörld"),
            "response from grpc-app: you sent héllo wörld"
        );
    }
}
