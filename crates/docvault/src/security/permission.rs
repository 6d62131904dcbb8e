//! Permission checking utilities

use chrono::{DateTime, Utc};

use crate::models::{AccessLevel, AccessVerdict, Document, DocumentShare, EffectiveAccess};

/// Highest level among the grants that are active at `now`.
///
/// Pure filter-then-max. Duplicate or overlapping grants are expected to be
/// rare but are never an error.
pub fn effective_level<'a, I>(grants: I, now: DateTime<Utc>) -> Option<AccessLevel>
where
    I: IntoIterator<Item = &'a DocumentShare>,
{
    grants
        .into_iter()
        .filter(|g| g.is_active_at(now))
        .map(|g| g.access_level)
        .max()
}

/// Decide access for `requester` on `document` given that requester's grants.
///
/// Ownership short-circuits every other check.
pub fn decide<'a, I>(
    document: &Document,
    requester: &str,
    grants: I,
    required: AccessLevel,
    now: DateTime<Utc>,
) -> AccessVerdict
where
    I: IntoIterator<Item = &'a DocumentShare>,
{
    if document.is_owned_by(requester) {
        return AccessVerdict::Allowed(EffectiveAccess::Owner);
    }

    match effective_level(
        grants
            .into_iter()
            .filter(|g| g.document_id == document.id && g.recipient_id == requester),
        now,
    ) {
        Some(level) if level.satisfies(required) => {
            AccessVerdict::Allowed(EffectiveAccess::Granted(level))
        }
        _ => AccessVerdict::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn document() -> Document {
        let now = Utc::now();
        Document {
            id: "doc".into(),
            owner_id: "alice".into(),
            status: DocumentStatus::Ready,
            title: "Plan".into(),
            description: None,
            tags: BTreeSet::new(),
            is_public: false,
            file_name: "plan.txt".into(),
            mime_type: "text/plain".into(),
            file_size: 4,
            storage_key: "k".into(),
            content_text: None,
            page_count: None,
            thumbnail_key: None,
            version: 1,
            view_count: 0,
            download_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn grant(level: AccessLevel, revoked: bool, expires_at: Option<DateTime<Utc>>) -> DocumentShare {
        let now = Utc::now();
        DocumentShare {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: "doc".into(),
            owner_id: "alice".into(),
            recipient_id: "bob".into(),
            access_level: level,
            expires_at,
            revoked,
            accepted_at: None,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_effective_level_takes_max_of_active() {
        let now = Utc::now();
        let grants = vec![
            grant(AccessLevel::View, false, None),
            grant(AccessLevel::Edit, true, None),
            grant(AccessLevel::Download, false, Some(now + Duration::hours(1))),
            grant(AccessLevel::Edit, false, Some(now - Duration::hours(1))),
        ];
        assert_eq!(effective_level(&grants, now), Some(AccessLevel::Download));
    }

    #[test]
    fn test_effective_level_empty_and_duplicates() {
        let now = Utc::now();
        assert_eq!(effective_level(&Vec::<DocumentShare>::new(), now), None);

        let dupes = vec![
            grant(AccessLevel::Edit, false, None),
            grant(AccessLevel::Edit, false, None),
        ];
        assert_eq!(effective_level(&dupes, now), Some(AccessLevel::Edit));
    }

    #[test]
    fn test_owner_short_circuits() {
        let doc = document();
        let verdict = decide(&doc, "alice", &[], AccessLevel::Edit, Utc::now());
        assert_eq!(verdict, AccessVerdict::Allowed(EffectiveAccess::Owner));
    }

    #[test]
    fn test_no_grant_is_denied() {
        let doc = document();
        for want in AccessLevel::ALL {
            assert_eq!(decide(&doc, "mallory", &[], want, Utc::now()), AccessVerdict::Denied);
        }
    }

    #[test]
    fn test_grant_matrix() {
        let doc = document();
        let now = Utc::now();
        for have in AccessLevel::ALL {
            let grants = vec![grant(have, false, None)];
            for want in AccessLevel::ALL {
                let verdict = decide(&doc, "bob", &grants, want, now);
                if have.satisfies(want) {
                    assert_eq!(verdict, AccessVerdict::Allowed(EffectiveAccess::Granted(have)));
                } else {
                    assert_eq!(verdict, AccessVerdict::Denied);
                }
            }
        }
    }

    #[test]
    fn test_grants_for_other_recipients_are_ignored() {
        let doc = document();
        let mut other = grant(AccessLevel::Edit, false, None);
        other.recipient_id = "carol".into();
        assert_eq!(
            decide(&doc, "bob", &[other], AccessLevel::View, Utc::now()),
            AccessVerdict::Denied
        );
    }
}
