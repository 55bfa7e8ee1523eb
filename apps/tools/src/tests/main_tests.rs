use super::*;

#[test]
fn stale_cutoff_subtracts_hours() {
    let now = Utc::now();
    let cutoff = stale_cutoff(now, 24).expect("cutoff");
    assert_eq!(now - cutoff, Duration::hours(24));
}

#[test]
fn negative_age_cuts_off_at_now() {
    let now = Utc::now();
    assert_eq!(stale_cutoff(now, -5).expect("cutoff"), now);
}

#[test]
fn huge_age_is_an_error_not_a_panic() {
    let now = Utc::now();
    assert!(stale_cutoff(now, i64::MAX).is_err());
    assert!(stale_cutoff(now, 2_000_000_000).is_err());
}
