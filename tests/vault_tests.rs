
use helper::*;
use obol_protocol::errors::EngineError;
use obol_protocol::events::Event;
use obol_protocol::interfaces::AssetId;
use obol_protocol::shared_structs::ProtocolStops;
use primitive_types::U256;

#[test]
fn create_vault_moves_tokens_and_records_the_position() {
    let mut helper = Helper::new();
    let alpha_before = helper.alpha_balance(alice());

    let id = helper.open_alpha_vault(alice(), 800, 1000, 110);

    // Collateral pulled into the engine, oUSD minted to the borrower.
    assert_eq!(helper.alpha_balance(alice()), alpha_before - dec(800));
    assert_eq!(helper.alpha_balance(engine_address()), dec(800));
    assert_eq!(helper.stable_balance(alice()), dec(1000));

    let info = helper.engine.vault_info(asset_alpha(), alice()).unwrap();
    assert_eq!(info.collateral, dec(800));
    assert_eq!(info.debt, dec(1000));
    assert_eq!(info.mcr, pct(110));
    assert_eq!(info.nominal_ratio, pct(80));

    assert_eq!(helper.engine.vault_id(asset_alpha(), alice()), Some(id));
    assert_eq!(helper.engine.active_vaults(), 1);
    assert_eq!(helper.engine.sorted_vault_count(asset_alpha()), 1);
    assert_eq!(helper.engine.total_debt(asset_alpha()), dec(1000));
    assert_eq!(helper.engine.total_collateral(asset_alpha()), dec(800));
    assert_eq!(helper.engine.total_protocol_debt(), dec(1000));

    let events = helper.engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, Event::NewVault(ev) if ev.vault_id == id)));
}

#[test]
fn create_vault_rejects_duplicates_and_bad_arguments() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    assert_eq!(
        helper.engine.create_vault(
            alice(),
            asset_alpha(),
            dec(100),
            dec(200),
            pct(110),
            None,
            None
        ),
        Err(EngineError::VaultAlreadyExists)
    );
    // The same owner may open on a different collateral.
    assert!(helper
        .engine
        .create_vault(alice(), asset_beta(), dec(800), dec(1000), pct(110), None, None)
        .is_ok());

    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), U256::zero(), dec(200), pct(110), None, None),
        Err(EngineError::ZeroAmount)
    );
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(100), U256::zero(), pct(110), None, None),
        Err(EngineError::ZeroAmount)
    );
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(1000), pct(105), None, None),
        Err(EngineError::InvalidMcr)
    );
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(1000), pct(250), None, None),
        Err(EngineError::InvalidMcr)
    );
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(50), pct(110), None, None),
        Err(EngineError::VaultBelowMinDebt)
    );
    // 100 collateral at price 6 against 1000 debt: 60% < 110%.
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(100), dec(1000), pct(110), None, None),
        Err(EngineError::VaultBelowMcr)
    );
    assert_eq!(
        helper.engine.create_vault(
            bob(),
            AssetId::repeat_byte(0x99),
            dec(800),
            dec(1000),
            pct(110),
            None,
            None
        ),
        Err(EngineError::InvalidCollateral)
    );

    helper.engine.set_is_active(protocol_owner(), asset_alpha(), false).unwrap();
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(1000), pct(110), None, None),
        Err(EngineError::InactiveCollateral)
    );
}

#[test]
fn create_vault_respects_the_mint_cap() {
    let mut helper = Helper::new();
    helper
        .engine
        .set_collateral_parameters(
            protocol_owner(),
            asset_alpha(),
            pct(110),
            pct(200),
            U256::exp10(16),
            U256::exp10(16),
            U256::exp10(16) * 5,
            dec(100),
            dec(1000), // mint cap
            U256::exp10(15) * 25,
        )
        .unwrap();

    helper.open_alpha_vault(alice(), 800, 900, 110);
    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(101), pct(110), None, None),
        Err(EngineError::MintCapExceeded)
    );
    assert!(helper
        .engine
        .create_vault(bob(), asset_alpha(), dec(800), dec(100), pct(110), None, None)
        .is_ok());
}

#[test]
fn adjust_vault_applies_each_delta_and_reruns_the_invariant() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    // Add collateral and mint more debt in two separate adjustments.
    helper
        .engine
        .adjust_vault(alice(), asset_alpha(), dec(200), U256::zero(), U256::zero(), U256::zero(), None, None)
        .unwrap();
    let info = helper.engine.vault_info(asset_alpha(), alice()).unwrap();
    assert_eq!(info.collateral, dec(1000));

    helper
        .engine
        .adjust_vault(alice(), asset_alpha(), U256::zero(), U256::zero(), dec(500), U256::zero(), None, None)
        .unwrap();
    assert_eq!(helper.stable_balance(alice()), dec(1500));
    assert_eq!(helper.engine.total_debt(asset_alpha()), dec(1500));

    // Withdraw within the MCR headroom and repay part of the debt.
    helper
        .engine
        .adjust_vault(alice(), asset_alpha(), U256::zero(), dec(400), U256::zero(), dec(500), None, None)
        .unwrap();
    let info = helper.engine.vault_info(asset_alpha(), alice()).unwrap();
    assert_eq!(info.collateral, dec(600));
    assert_eq!(info.debt, dec(1000));
    assert_eq!(helper.stable_balance(alice()), dec(1000));
    assert_eq!(helper.alpha_balance(engine_address()), dec(600));
}

#[test]
fn adjust_vault_rejects_invalid_shapes() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    // Both directions of one pair set.
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            dec(1),
            dec(1),
            U256::zero(),
            U256::zero(),
            None,
            None
        ),
        Err(EngineError::InvalidParameter("both collateral directions set"))
    );
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            U256::zero(),
            U256::zero(),
            dec(1),
            dec(1),
            None,
            None
        ),
        Err(EngineError::InvalidParameter("both debt directions set"))
    );
    // Nothing at all.
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            None,
            None
        ),
        Err(EngineError::ZeroAmount)
    );
    // No vault.
    assert_eq!(
        helper.engine.adjust_vault(
            bob(),
            asset_alpha(),
            dec(1),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            None,
            None
        ),
        Err(EngineError::VaultNotFound)
    );
    // Withdrawing more than is there.
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            U256::zero(),
            dec(801),
            U256::zero(),
            U256::zero(),
            None,
            None
        ),
        Err(EngineError::InvalidParameter("withdrawal exceeds collateral"))
    );
    // Withdrawing into liquidation territory: (800-620)*6*100/1000 = 108%.
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            U256::zero(),
            dec(620),
            U256::zero(),
            U256::zero(),
            None,
            None
        ),
        Err(EngineError::VaultBelowMcr)
    );
    // Repaying under the minimum debt.
    assert_eq!(
        helper.engine.adjust_vault(
            alice(),
            asset_alpha(),
            U256::zero(),
            U256::zero(),
            U256::zero(),
            dec(950),
            None,
            None
        ),
        Err(EngineError::VaultBelowMinDebt)
    );

    // Nothing above committed anything.
    let info = helper.engine.vault_info(asset_alpha(), alice()).unwrap();
    assert_eq!(info.collateral, dec(800));
    assert_eq!(info.debt, dec(1000));
}

#[test]
fn adjust_vault_mcr_reprices_and_reranks() {
    let mut helper = Helper::new();
    // Equal nominal ratios; the lower MCR sits at the tail.
    helper.open_alpha_vault(alice(), 600, 1000, 110);
    let bob_id = helper
        .engine
        .create_vault(bob(), asset_alpha(), dec(600), dec(1000), pct(120), None, None)
        .unwrap();

    let order = helper.engine.next_redemptions(asset_alpha(), 10);
    assert_eq!(order[0].0, alice());

    helper
        .engine
        .adjust_vault_mcr(alice(), asset_alpha(), pct(130), None, None)
        .unwrap();
    let order = helper.engine.next_redemptions(asset_alpha(), 10);
    assert_eq!(order[0].0, bob());
    assert_eq!(helper.engine.vault_id(asset_alpha(), bob()), Some(bob_id));

    assert_eq!(
        helper.engine.adjust_vault_mcr(alice(), asset_alpha(), pct(130), None, None),
        Err(EngineError::InvalidParameter("MCR unchanged"))
    );
    assert_eq!(
        helper.engine.adjust_vault_mcr(alice(), asset_alpha(), pct(105), None, None),
        Err(EngineError::InvalidMcr)
    );
}

#[test]
fn insertion_hints_are_honored_and_survive_going_stale() {
    let mut helper = Helper::new();
    let alice_id = helper.open_alpha_vault(alice(), 800, 1000, 110); // NCR 80
    let bob_id = helper
        .engine
        .create_vault(bob(), asset_alpha(), dec(400), dec(1000), pct(110), Some(alice_id), None)
        .unwrap(); // NCR 40, valid tail hint
    helper
        .engine
        .create_vault(
            carol(),
            asset_alpha(),
            dec(600),
            dec(1000),
            pct(110),
            Some(alice_id),
            Some(bob_id),
        )
        .unwrap(); // NCR 60, valid middle hint

    let order: Vec<_> = helper
        .engine
        .next_redemptions(asset_alpha(), 10)
        .into_iter()
        .map(|(owner, _)| owner)
        .collect();
    assert_eq!(order, vec![bob(), carol(), alice()]);

    // A hint pointing to the wrong end still lands correctly.
    helper
        .engine
        .create_vault(dave(), asset_alpha(), dec(900), dec(1000), pct(110), Some(bob_id), None)
        .unwrap(); // NCR 90, should be the head
    let order: Vec<_> = helper
        .engine
        .next_redemptions(asset_alpha(), 10)
        .into_iter()
        .map(|(owner, _)| owner)
        .collect();
    assert_eq!(order, vec![bob(), carol(), alice(), dave()]);
}

#[test]
fn close_vault_settles_both_legs() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    helper.engine.close_vault(alice(), asset_alpha()).unwrap();

    assert_eq!(helper.stable_balance(alice()), U256::zero());
    assert_eq!(helper.alpha_balance(alice()), dec(1_000_000));
    assert_eq!(helper.alpha_balance(engine_address()), U256::zero());
    assert_eq!(helper.engine.active_vaults(), 0);
    assert_eq!(helper.engine.sorted_vault_count(asset_alpha()), 0);
    assert_eq!(helper.engine.total_debt(asset_alpha()), U256::zero());
    assert_eq!(helper.engine.total_protocol_debt(), U256::zero());
    assert_eq!(
        helper.engine.vault_info(asset_alpha(), alice()),
        Err(EngineError::VaultNotFound)
    );
    assert_eq!(
        helper.engine.close_vault(alice(), asset_alpha()),
        Err(EngineError::VaultNotFound)
    );
}

#[test]
fn close_vault_aborts_cleanly_when_the_burn_fails() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    // Alice no longer holds her full debt.
    helper.stable.set_balance(alice(), dec(990));
    let result = helper.engine.close_vault(alice(), asset_alpha());
    assert!(matches!(result, Err(EngineError::TokenTransferFailed(_))));

    // The failed pull left everything in place.
    let info = helper.engine.vault_info(asset_alpha(), alice()).unwrap();
    assert_eq!(info.collateral, dec(800));
    assert_eq!(info.debt, dec(1000));
    assert_eq!(helper.stable_balance(alice()), dec(990));
    assert_eq!(helper.engine.active_vaults(), 1);
}

#[test]
fn transfer_vault_ownership_moves_the_whole_record() {
    let mut helper = Helper::new();
    let id = helper.open_alpha_vault(alice(), 800, 1000, 110);

    assert_eq!(
        helper
            .engine
            .transfer_vault_ownership(alice(), asset_alpha(), alice(), None, None),
        Err(EngineError::InvalidParameter("recipient is the caller"))
    );

    helper
        .engine
        .transfer_vault_ownership(alice(), asset_alpha(), bob(), None, None)
        .unwrap();

    assert_eq!(
        helper.engine.vault_info(asset_alpha(), alice()),
        Err(EngineError::VaultNotFound)
    );
    let info = helper.engine.vault_info(asset_alpha(), bob()).unwrap();
    assert_eq!(info.collateral, dec(800));
    assert_eq!(info.debt, dec(1000));
    assert_eq!(helper.engine.vault_id(asset_alpha(), bob()), Some(id));
    // No tokens moved: the oUSD stays where it was minted.
    assert_eq!(helper.stable_balance(alice()), dec(1000));
    assert_eq!(helper.stable_balance(bob()), U256::zero());

    // The recipient slot must be free.
    helper.open_alpha_vault(alice(), 800, 1000, 110);
    assert_eq!(
        helper
            .engine
            .transfer_vault_ownership(alice(), asset_alpha(), bob(), None, None),
        Err(EngineError::VaultAlreadyExists)
    );

    // An unhealthy position cannot be handed over.
    helper.oracle.set_price(asset_alpha(), dec(1));
    assert_eq!(
        helper
            .engine
            .transfer_vault_ownership(alice(), asset_alpha(), carol(), None, None),
        Err(EngineError::VaultBelowMcr)
    );
}

#[test]
fn aggregates_match_per_vault_sums_across_assets() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);
    helper.open_alpha_vault(bob(), 600, 1200, 120);
    helper
        .engine
        .create_vault(carol(), asset_beta(), dec(500), dec(700), pct(150), None, None)
        .unwrap();

    let alpha_debt: U256 = [alice(), bob()]
        .iter()
        .map(|u| helper.engine.vault_info(asset_alpha(), *u).unwrap().debt)
        .fold(U256::zero(), |acc, d| acc + d);
    assert_eq!(helper.engine.total_debt(asset_alpha()), alpha_debt);
    assert_eq!(helper.engine.total_debt(asset_beta()), dec(700));
    assert_eq!(
        helper.engine.total_protocol_debt(),
        helper.engine.total_debt(asset_alpha()) + helper.engine.total_debt(asset_beta())
    );
    assert_eq!(helper.engine.active_vaults(), 3);
    assert_eq!(
        helper.engine.active_vaults(),
        helper.engine.sorted_vault_count(asset_alpha())
            + helper.engine.sorted_vault_count(asset_beta())
    );
    assert_eq!(helper.engine.total_collateral(asset_alpha()), dec(1400));
}

#[test]
fn oracle_failure_aborts_the_operation() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    helper.oracle.clear_price(asset_alpha());
    let result = helper.engine.adjust_vault(
        alice(),
        asset_alpha(),
        dec(1),
        U256::zero(),
        U256::zero(),
        U256::zero(),
        None,
        None,
    );
    assert!(matches!(result, Err(EngineError::OracleFailure(_))));
    assert_eq!(
        helper.engine.vault_info(asset_alpha(), alice()).unwrap().collateral,
        dec(800)
    );
}

#[test]
fn stops_pause_their_operation_class() {
    let mut helper = Helper::new();
    helper.open_alpha_vault(alice(), 800, 1000, 110);

    helper
        .engine
        .set_stops(
            protocol_owner(),
            ProtocolStops { openings: true, adjustments: true, liquidations: false, redemptions: false },
        )
        .unwrap();

    assert_eq!(
        helper
            .engine
            .create_vault(bob(), asset_alpha(), dec(800), dec(1000), pct(110), None, None),
        Err(EngineError::InvalidParameter("vault openings are stopped"))
    );
    assert_eq!(
        helper.engine.close_vault(alice(), asset_alpha()),
        Err(EngineError::InvalidParameter("vault adjustments are stopped"))
    );

    helper.engine.set_stops(protocol_owner(), ProtocolStops::default()).unwrap();
    assert!(helper.engine.close_vault(alice(), asset_alpha()).is_ok());
}

#[test]
fn admin_surface_is_owner_gated_and_one_shot() {
    let mut helper = Helper::new();

    assert_eq!(
        helper.engine.set_redemption_fee(alice(), U256::exp10(16)),
        Err(EngineError::NotAuthorized)
    );
    assert_eq!(
        helper.engine.set_is_active(alice(), asset_alpha(), false),
        Err(EngineError::NotAuthorized)
    );
    assert_eq!(
        helper.engine.set_stops(alice(), ProtocolStops::default()),
        Err(EngineError::NotAuthorized)
    );

    // Re-wiring the collaborators is not possible.
    let stable = helper.stable.clone();
    let oracle = helper.oracle.clone();
    assert_eq!(
        helper.engine.set_addresses(
            protocol_owner(),
            Box::new(stable),
            Box::new(oracle),
            treasury()
        ),
        Err(EngineError::InvalidParameter("addresses already set"))
    );
}
