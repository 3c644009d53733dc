use chrono::Utc;
use telegram_dice_bot::{Account, DAILY_PLAY_LIMIT, Profile, Rejection, check_eligibility};

fn account(blocked: bool, phone: Option<&str>, plays: u32) -> Account {
    let mut a = Account::new(1, Profile::default(), Utc::now());
    a.is_blocked = blocked;
    a.phone = phone.map(str::to_string);
    a.plays = plays;
    a
}

#[test]
fn missing_account_is_unknown_user() {
    assert_eq!(check_eligibility(None), Err(Rejection::UnknownUser));
}

#[test]
fn blocked_wins_over_every_other_reason() {
    let a = account(true, None, DAILY_PLAY_LIMIT);
    assert_eq!(check_eligibility(Some(&a)), Err(Rejection::Blocked));
}

#[test]
fn missing_phone_wins_over_daily_limit() {
    let a = account(false, None, DAILY_PLAY_LIMIT);
    assert_eq!(check_eligibility(Some(&a)), Err(Rejection::PhoneNotVerified));

    // a blank phone is not a verified phone
    let a = account(false, Some("   "), 0);
    assert_eq!(check_eligibility(Some(&a)), Err(Rejection::PhoneNotVerified));
}

#[test]
fn limit_is_reached_at_ten_plays() {
    let a = account(false, Some("+391234"), DAILY_PLAY_LIMIT - 1);
    assert_eq!(check_eligibility(Some(&a)), Ok(()));

    let a = account(false, Some("+391234"), DAILY_PLAY_LIMIT);
    assert_eq!(check_eligibility(Some(&a)), Err(Rejection::DailyLimitReached));
}
