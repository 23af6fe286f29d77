//! Reading NETDOM output.
//!
//! The markers below are the whole contract with the remote side. All matching
//! goes through [`classify`]; the verdict helpers only look at its result.

use crate::CommandResult;

pub const VERIFIED_MARKER: &str = "has been verified";
pub const ALREADY_JOINED_MARKER: &str = "already joined to a domain";
pub const COMPLETED_MARKER: &str = "The command completed successfully";

/// Which markers appeared anywhere in a batch's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub verified: bool,
    pub already_joined: bool,
    pub completed: bool,
}

/// Case-sensitive substring scan over every line. Line order does not matter.
pub fn classify(result: &CommandResult) -> Signals {
    result.texts().fold(Signals::default(), |signals, line| Signals {
        verified: signals.verified || line.contains(VERIFIED_MARKER),
        already_joined: signals.already_joined || line.contains(ALREADY_JOINED_MARKER),
        completed: signals.completed || line.contains(COMPLETED_MARKER),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainMembership {
    Member,
    NotMember,
}

impl DomainMembership {
    pub fn is_member(self) -> bool {
        matches!(self, DomainMembership::Member)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinVerdict {
    AlreadyJoined,
    Joined,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameVerdict {
    Renamed,
    Failed,
}

pub fn domain_membership(result: &CommandResult) -> DomainMembership {
    if classify(result).verified {
        DomainMembership::Member
    } else {
        DomainMembership::NotMember
    }
}

/// "already joined" wins over "completed" when both appear.
pub fn join_verdict(result: &CommandResult) -> JoinVerdict {
    let signals = classify(result);
    if signals.already_joined {
        JoinVerdict::AlreadyJoined
    } else if signals.completed {
        JoinVerdict::Joined
    } else {
        JoinVerdict::Failed
    }
}

pub fn rename_verdict(result: &CommandResult) -> RenameVerdict {
    if classify(result).completed {
        RenameVerdict::Renamed
    } else {
        RenameVerdict::Failed
    }
}

/// First non-blank line of `hostname` output, trimmed.
pub fn discovered_hostname(result: &CommandResult) -> Option<String> {
    result
        .texts()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

pub fn hostname_matches(current: Option<&str>, desired: &str) -> bool {
    current.is_some_and(|current| current.to_lowercase() == desired.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(lines: &[&str]) -> CommandResult {
        CommandResult::from_lines("10.1.1.100", lines.iter().copied())
    }

    #[test]
    fn test_domain_membership() {
        assert_eq!(
            domain_membership(&output(&["The computer WEB1 has been verified"])),
            DomainMembership::Member
        );
        assert_eq!(
            domain_membership(&output(&["has not been verified"])),
            DomainMembership::NotMember
        );
        assert_eq!(domain_membership(&output(&[])), DomainMembership::NotMember);
    }

    #[test]
    fn test_join_verdicts() {
        assert_eq!(
            join_verdict(&output(&["The command completed successfully."])),
            JoinVerdict::Joined
        );
        assert_eq!(
            join_verdict(&output(&[
                "The machine is already joined to a domain.",
                "ERRORLEVEL: 2691"
            ])),
            JoinVerdict::AlreadyJoined
        );
        assert_eq!(
            join_verdict(&output(&["Access denied", "ERRORLEVEL: 5"])),
            JoinVerdict::Failed
        );
    }

    #[test]
    fn test_join_already_joined_takes_precedence_regardless_of_order() {
        let completed_first = output(&[
            "The command completed successfully",
            "already joined to a domain",
        ]);
        let joined_first = output(&[
            "already joined to a domain",
            "The command completed successfully",
        ]);
        assert_eq!(join_verdict(&completed_first), JoinVerdict::AlreadyJoined);
        assert_eq!(join_verdict(&joined_first), JoinVerdict::AlreadyJoined);
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert_eq!(
            join_verdict(&output(&["the command completed successfully"])),
            JoinVerdict::Failed
        );
        assert_eq!(
            domain_membership(&output(&["HAS BEEN VERIFIED"])),
            DomainMembership::NotMember
        );
    }

    #[test]
    fn test_rename_verdict() {
        assert_eq!(
            rename_verdict(&output(&["", "The command completed successfully.", ""])),
            RenameVerdict::Renamed
        );
        assert_eq!(
            rename_verdict(&output(&["The command did not complete successfully"])),
            RenameVerdict::Failed
        );
    }

    #[test]
    fn test_discovered_hostname() {
        assert_eq!(
            discovered_hostname(&output(&["", "  \r", "WIN-ABC123\r\n", "other"])),
            Some("WIN-ABC123".to_string())
        );
        assert_eq!(discovered_hostname(&output(&["", " "])), None);
    }

    #[test]
    fn test_hostname_matches() {
        assert!(hostname_matches(Some("myhostname"), "myhostname"));
        assert!(hostname_matches(Some("MYHOSTNAME"), "myhostname"));
        assert!(!hostname_matches(Some("bogusname"), "myhostname"));
        assert!(!hostname_matches(None, "myhostname"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn property_unrecognized_output_is_failure(lines in prop::collection::vec("[a-zA-Z0-9 .:]{0,40}", 0..8)) {
                for line in &lines {
                    prop_assume!(!line.contains(COMPLETED_MARKER));
                    prop_assume!(!line.contains(ALREADY_JOINED_MARKER));
                    prop_assume!(!line.contains(VERIFIED_MARKER));
                }
                let result = CommandResult::from_lines("host", lines);
                prop_assert_eq!(join_verdict(&result), JoinVerdict::Failed);
                prop_assert_eq!(rename_verdict(&result), RenameVerdict::Failed);
                prop_assert_eq!(domain_membership(&result), DomainMembership::NotMember);
            }

            #[test]
            fn property_marker_anywhere_is_detected(
                noise in prop::collection::vec("[a-z0-9 ]{0,20}", 0..6),
                position in 0usize..6,
                prefix in "[a-zA-Z ]{0,10}",
                suffix in "[a-zA-Z .]{0,10}",
            ) {
                let mut lines = noise;
                let index = position.min(lines.len());
                lines.insert(index, format!("{prefix}{COMPLETED_MARKER}{suffix}"));
                let result = CommandResult::from_lines("host", lines);
                prop_assert!(classify(&result).completed);
                prop_assert_eq!(rename_verdict(&result), RenameVerdict::Renamed);
            }

            #[test]
            fn property_hostname_comparison_ignores_case(name in "[a-zA-Z0-9-]{1,15}") {
                let upper = name.to_uppercase();
                let lower = name.to_lowercase();
                prop_assert!(hostname_matches(Some(upper.as_str()), &name));
                prop_assert!(hostname_matches(Some(lower.as_str()), &upper));
            }
        }
    }
}
