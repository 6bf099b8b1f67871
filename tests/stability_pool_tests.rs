
use helper::*;
use obol_protocol::errors::EngineError;
use obol_protocol::events::Event;
use obol_protocol::math::ONE;
use primitive_types::U256;

#[test]
fn deposits_move_stable_into_the_pool_account() {
    let mut helper = Helper::new();
    helper.stable.set_balance(alice(), dec(500));

    helper.engine.pool_deposit(alice(), dec(300), &[]).unwrap();

    assert_eq!(helper.stable_balance(alice()), dec(200));
    assert_eq!(helper.stable_balance(pool_address()), dec(300));
    assert_eq!(helper.engine.pool_info().total_deposits, dec(300));
    assert_eq!(helper.engine.compounded_deposit(alice()), dec(300));

    // Topping up compounds first, then adds.
    helper.engine.pool_deposit(alice(), dec(200), &[]).unwrap();
    assert_eq!(helper.engine.compounded_deposit(alice()), dec(500));
    assert_eq!(helper.engine.pool_info().total_deposits, dec(500));
}

#[test]
fn deposit_and_withdraw_argument_validation() {
    let mut helper = Helper::new();
    helper.stable.set_balance(alice(), dec(500));

    assert_eq!(
        helper.engine.pool_deposit(alice(), U256::zero(), &[]),
        Err(EngineError::ZeroAmount)
    );
    assert_eq!(
        helper
            .engine
            .pool_deposit(alice(), dec(100), &[asset_beta(), asset_alpha()]),
        Err(EngineError::ArrayNotAscending)
    );
    assert_eq!(
        helper
            .engine
            .pool_deposit(alice(), dec(100), &[asset_alpha(), asset_alpha()]),
        Err(EngineError::ArrayNotAscending)
    );
    assert_eq!(
        helper.engine.pool_withdraw(alice(), dec(100), &[]),
        Err(EngineError::InsufficientDeposit)
    );
    // A failed pull commits nothing.
    assert_eq!(
        helper.engine.pool_deposit(alice(), dec(501), &[]),
        Err(EngineError::TokenTransferFailed(
            obol_protocol::errors::TokenError::InsufficientBalance
        ))
    );
    assert_eq!(helper.engine.pool_info().total_deposits, U256::zero());
}

#[test]
fn withdraw_returns_the_deposit_when_nothing_was_liquidated() {
    let mut helper = Helper::new();
    helper.stable.set_balance(alice(), dec(500));
    helper.engine.pool_deposit(alice(), dec(500), &[]).unwrap();

    let (stable_out, gains) = helper
        .engine
        .pool_withdraw(alice(), dec(500), &[asset_alpha(), asset_beta()])
        .unwrap();
    assert_eq!(stable_out, dec(500));
    assert!(gains.is_empty());
    assert_eq!(helper.stable_balance(alice()), dec(500));
    assert_eq!(helper.engine.pool_info().total_deposits, U256::zero());

    // The ledger entry is gone.
    assert_eq!(
        helper.engine.pool_withdraw(alice(), dec(1), &[]),
        Err(EngineError::InsufficientDeposit)
    );
}

#[test]
fn withdrawal_is_capped_at_the_compounded_deposit() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 1000, 2800, 110);
    helper.stable.set_balance(bob(), dec(5000));
    helper.engine.pool_deposit(bob(), dec(5000), &[]).unwrap();

    helper.oracle.set_price(asset_alpha(), dec(3));
    helper
        .engine
        .liquidate_vault(carol(), asset_alpha(), alice(), None, None)
        .unwrap();

    // Asking for the original 5000 returns only the compounded ~2200.
    let (stable_out, _gains) = helper
        .engine
        .pool_withdraw(bob(), dec(5000), &[asset_alpha()])
        .unwrap();
    assert_close(stable_out, dec(2200), U256::exp10(6));
}

#[test]
fn claim_only_withdrawal_keeps_the_deposit_compounding() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 1000, 2800, 110);
    helper.stable.set_balance(bob(), dec(5000));
    helper.engine.pool_deposit(bob(), dec(5000), &[]).unwrap();

    helper.oracle.set_price(asset_alpha(), dec(3));
    helper
        .engine
        .liquidate_vault(carol(), asset_alpha(), alice(), None, None)
        .unwrap();

    let bob_alpha_before = helper.alpha_balance(bob());
    let (stable_out, gains) = helper
        .engine
        .pool_withdraw(bob(), U256::zero(), &[asset_alpha()])
        .unwrap();
    assert_eq!(stable_out, U256::zero());
    assert_eq!(gains.len(), 1);
    assert_close(gains[0].1, dec(2870) / 3, U256::exp10(6));
    assert_eq!(helper.alpha_balance(bob()), bob_alpha_before + gains[0].1);

    // Deposit stays in, already compounded.
    assert_close(helper.engine.compounded_deposit(bob()), dec(2200), U256::exp10(6));
    // A second claim finds nothing new.
    let (_, gains) = helper
        .engine
        .pool_withdraw(bob(), U256::zero(), &[asset_alpha()])
        .unwrap();
    assert!(gains.is_empty());
}

#[test]
fn gains_are_paid_on_deposit_top_up() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 1000, 2800, 110);
    helper.stable.set_balance(bob(), dec(6000));
    helper.engine.pool_deposit(bob(), dec(5000), &[]).unwrap();

    helper.oracle.set_price(asset_alpha(), dec(3));
    helper
        .engine
        .liquidate_vault(carol(), asset_alpha(), alice(), None, None)
        .unwrap();

    let bob_alpha_before = helper.alpha_balance(bob());
    let gains = helper
        .engine
        .pool_deposit(bob(), dec(1000), &[asset_alpha(), asset_beta()])
        .unwrap();
    assert_eq!(gains.len(), 1);
    assert_close(gains[0].1, dec(2870) / 3, U256::exp10(6));
    assert_eq!(helper.alpha_balance(bob()), bob_alpha_before + gains[0].1);
    assert_close(helper.engine.compounded_deposit(bob()), dec(3200), U256::exp10(6));

    let events = helper.engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::StabilityContribution(ev) if ev.depositor == bob())));
}

#[test]
fn depositor_sums_stay_within_the_pool_total() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 1000, 2800, 110);
    helper
        .engine
        .create_vault(bob(), asset_beta(), dec(500), dec(1400), pct(110), None, None)
        .unwrap();

    for (user, amount) in [(carol(), 4000u64), (dave(), 2500), (eve(), 3500)] {
        helper.stable.set_balance(user, dec(amount));
        helper.engine.pool_deposit(user, dec(amount), &[]).unwrap();
    }

    helper.oracle.set_price(asset_alpha(), dec(3));
    helper.oracle.set_price(asset_beta(), dec(3));
    helper
        .engine
        .liquidate_vault(alice(), asset_alpha(), alice(), None, None)
        .unwrap();
    helper
        .engine
        .liquidate_vault(alice(), asset_beta(), bob(), None, None)
        .unwrap();

    let sum = helper.engine.compounded_deposit(carol())
        + helper.engine.compounded_deposit(dave())
        + helper.engine.compounded_deposit(eve());
    assert!(sum <= helper.engine.pool_info().total_deposits);
    assert!(helper.engine.pool_info().total_deposits - sum < ONE);
}

#[test]
fn emptying_the_pool_rolls_the_epoch_for_every_depositor() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 100, 300, 110);
    helper.stable.set_balance(bob(), dec(120));
    helper.stable.set_balance(carol(), dec(80));
    helper.engine.pool_deposit(bob(), dec(120), &[]).unwrap();
    helper.engine.pool_deposit(carol(), dec(80), &[]).unwrap();

    helper.oracle.set_price(asset_alpha(), dec(3));
    helper
        .engine
        .liquidate_vault(dave(), asset_alpha(), alice(), None, None)
        .unwrap();

    let info = helper.engine.pool_info();
    assert_eq!(info.current_epoch, 1);
    assert_eq!(info.current_scale, 0);
    assert_eq!(info.p, ONE);
    assert_eq!(info.total_deposits, U256::zero());
    assert_eq!(helper.engine.compounded_deposit(bob()), U256::zero());
    assert_eq!(helper.engine.compounded_deposit(carol()), U256::zero());

    // Gains survive and split 60/40.
    let pool_collateral = dec(205) / 3;
    assert_close(
        helper.engine.depositor_collateral_gain(bob(), asset_alpha()),
        pool_collateral * 6 / 10,
        U256::exp10(6),
    );
    assert_close(
        helper.engine.depositor_collateral_gain(carol(), asset_alpha()),
        pool_collateral * 4 / 10,
        U256::exp10(6),
    );

    // Claiming after the roll withdraws nothing but the gains.
    let assets = helper.engine.valid_collateral().to_vec();
    assert_eq!(assets, vec![asset_alpha(), asset_beta()]);
    let (stable_out, gains) = helper.engine.pool_withdraw(bob(), dec(120), &assets).unwrap();
    assert_eq!(stable_out, U256::zero());
    assert_eq!(gains.len(), 1);
}
