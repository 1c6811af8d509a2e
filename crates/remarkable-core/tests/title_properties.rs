//! Property tests: normalization reaches a fixed point after one pass.

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;
use remarkable_core::content::{normalize_title, TitleInput, TitleParts};
use remarkable_core::event::normalize_event;
use remarkable_core::ids::{validate, IdKind};
use remarkable_core::EventDraft;

fn tag_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("tag_[a-z]{1,8}", 0..4).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn plain_title_normalization_is_idempotent(plain in "\\PC{0,40}", tags in tag_list()) {
        let once = normalize_title(plain.clone().into(), Some(&tags), None);
        let twice = normalize_title(once.clone().into(), Some(&tags), None);
        prop_assert_eq!(&once.plain, &plain);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn styled_title_settles_after_one_pass(styled in "(<b>|</b>|<i>|</i>|&amp;|[a-zA-Z ]){0,24}") {
        let input = TitleInput::Parts(TitleParts {
            styled: Some(styled.clone()),
            ..TitleParts::default()
        });
        let once = normalize_title(input, None, None);
        let twice = normalize_title(once.clone().into(), None, None);
        prop_assert_eq!(&once.styled, &styled);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn event_normalization_is_idempotent(
        title in "[a-zA-Z0-9 ]{0,30}",
        description in "[a-zA-Z ,.!?\n]{0,60}",
        tags in tag_list(),
        start_hour in 0u32..23,
    ) {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let start = day.and_hms_opt(start_hour, 0, 0).unwrap();
        let draft = EventDraft {
            description: Some(description),
            tags: Some(tags),
            ..EventDraft::timed(&title, start, start + Duration::hours(1))
        };

        let now = Utc::now();
        let once = normalize_event(draft, None, now);
        let twice = normalize_event(once.clone().into(), Some(&once), now + Duration::seconds(1));

        prop_assert_eq!(&twice.id, &once.id);
        prop_assert_eq!(&twice.title, &once.title);
        prop_assert_eq!(&twice.event_log, &once.event_log);
        prop_assert_eq!(&twice.tags, &once.tags);
        prop_assert_eq!(twice.created_at, once.created_at);
        prop_assert_eq!(twice.local_version, once.local_version + 1);
    }

    #[test]
    fn any_supplied_id_ends_up_valid(id in "\\PC{0,32}") {
        let draft = EventDraft {
            id: Some(id.clone()),
            ..EventDraft::task("legacy")
        };
        let event = normalize_event(draft, None, Utc::now());
        prop_assert!(validate(&event.id, Some(IdKind::Event)));
        if validate(&id, Some(IdKind::Event)) {
            prop_assert_eq!(event.id, id);
        }
    }
}
