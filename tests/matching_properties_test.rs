use bitbasis::domain::{
    Decimal, Disposal, DisposalId, Lot, LotId, RealizedGainFragment, TaxMethod, Term, TimeMs,
    UserId, MS_PER_DAY,
};
use bitbasis::engine::{classify, DisposalMatcher, LedgerError, LotLedger};
use proptest::prelude::*;
use std::collections::HashMap;

const BASE_MS: i64 = 1_640_995_200_000; // 2022-01-01T00:00:00Z

fn user() -> UserId {
    UserId::new("prop-user")
}

/// Thousandths, so quantities and prices carry fractional digits.
fn milli(units: i64) -> Decimal {
    Decimal::from(units) / Decimal::from(1000)
}

fn method_strategy() -> impl Strategy<Value = TaxMethod> {
    prop_oneof![
        Just(TaxMethod::Fifo),
        Just(TaxMethod::Lifo),
        Just(TaxMethod::Hifo),
    ]
}

/// (quantity, cost per unit, acquisition day)
fn lots_strategy() -> impl Strategy<Value = Vec<(i64, i64, i64)>> {
    prop::collection::vec((1i64..5_000, 1i64..80_000_000, 0i64..1_500), 1..12)
}

fn build_ledger(specs: &[(i64, i64, i64)]) -> LotLedger {
    let mut ledger = LotLedger::new(user());
    for (i, &(qty, cost, day)) in specs.iter().enumerate() {
        ledger
            .add_lot(Lot::new(
                LotId::new(format!("lot-{:02}", i)),
                user(),
                milli(qty),
                milli(cost),
                TimeMs::new(BASE_MS + day * MS_PER_DAY),
            ))
            .unwrap();
    }
    ledger
}

fn disposal(id: &str, quantity: Decimal, day: i64) -> Disposal {
    Disposal::new(
        DisposalId::new(id),
        user(),
        quantity,
        milli(45_000_000),
        TimeMs::new(BASE_MS + day * MS_PER_DAY),
    )
}

fn lots_of<'a>(
    ledger: &'a LotLedger,
    fragments: &[RealizedGainFragment],
) -> Vec<&'a Lot> {
    fragments
        .iter()
        .map(|f| ledger.get(&f.lot_id).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn prop_fragments_sum_to_disposal_quantity(
        specs in lots_strategy(),
        method in method_strategy(),
        share in 1i64..=1000,
    ) {
        let mut ledger = build_ledger(&specs);
        let as_of_day = 2_000;
        let available = ledger.open_quantity(TimeMs::new(BASE_MS + as_of_day * MS_PER_DAY));
        let quantity = available * Decimal::from(share) / Decimal::from(1000);
        prop_assume!(quantity.is_positive());

        let fragments = DisposalMatcher::match_disposal(
            &mut ledger,
            &disposal("d", quantity, as_of_day),
            method,
        )
        .unwrap();

        let matched: Decimal = fragments.iter().map(|f| f.quantity_matched).sum();
        prop_assert_eq!(matched, quantity);
        for f in &fragments {
            prop_assert!(f.quantity_matched.is_positive());
            prop_assert_eq!(f.gain, f.proceeds - f.cost_basis);
        }
    }

    #[test]
    fn prop_consumed_quantity_matches_fragments(
        specs in lots_strategy(),
        method in method_strategy(),
        shares in prop::collection::vec(1i64..=400, 1..6),
    ) {
        let mut ledger = build_ledger(&specs);
        let mut all_fragments = Vec::new();

        for (i, share) in shares.iter().enumerate() {
            let day = 1_500 + i as i64;
            let available = ledger.open_quantity(TimeMs::new(BASE_MS + day * MS_PER_DAY));
            let quantity = available * Decimal::from(*share) / Decimal::from(1000);
            if !quantity.is_positive() {
                continue;
            }
            let fragments = DisposalMatcher::match_disposal(
                &mut ledger,
                &disposal(&format!("d{}", i), quantity, day),
                method,
            )
            .unwrap();
            all_fragments.extend(fragments);
        }

        let mut per_lot: HashMap<LotId, Decimal> = HashMap::new();
        for f in &all_fragments {
            *per_lot.entry(f.lot_id.clone()).or_insert_with(Decimal::zero) += f.quantity_matched;
        }
        for lot in ledger.lots() {
            let consumed = per_lot.get(&lot.id).copied().unwrap_or_else(Decimal::zero);
            prop_assert_eq!(lot.quantity - lot.remaining_quantity, consumed);
            prop_assert!(!lot.remaining_quantity.is_negative());
        }
    }

    #[test]
    fn prop_selection_order_follows_method(
        specs in lots_strategy(),
        method in method_strategy(),
        share in 1i64..=1000,
        as_of_day in 0i64..1_600,
    ) {
        let mut ledger = build_ledger(&specs);
        let available = ledger.open_quantity(TimeMs::new(BASE_MS + as_of_day * MS_PER_DAY));
        let quantity = available * Decimal::from(share) / Decimal::from(1000);
        prop_assume!(quantity.is_positive());

        let snapshot = ledger.clone();
        let fragments = DisposalMatcher::match_disposal(
            &mut ledger,
            &disposal("d", quantity, as_of_day),
            method,
        )
        .unwrap();
        let picked = lots_of(&snapshot, &fragments);

        for lot in &picked {
            prop_assert!(lot.acquired_at.as_ms() <= BASE_MS + as_of_day * MS_PER_DAY);
        }
        for pair in picked.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            match method {
                TaxMethod::Fifo => {
                    prop_assert!(a.acquired_at <= b.acquired_at);
                }
                TaxMethod::Lifo => {
                    prop_assert!(a.acquired_at >= b.acquired_at);
                }
                TaxMethod::Hifo => {
                    prop_assert!(a.cost_basis_per_unit >= b.cost_basis_per_unit);
                    if a.cost_basis_per_unit == b.cost_basis_per_unit {
                        prop_assert!(a.acquired_at <= b.acquired_at);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_insufficient_basis_leaves_ledger_unchanged(
        specs in lots_strategy(),
        method in method_strategy(),
        excess in 1i64..10_000,
        as_of_day in 0i64..1_600,
    ) {
        let mut ledger = build_ledger(&specs);
        let available = ledger.open_quantity(TimeMs::new(BASE_MS + as_of_day * MS_PER_DAY));
        let before = ledger.clone();

        let result = DisposalMatcher::match_disposal(
            &mut ledger,
            &disposal("d", available + milli(excess), as_of_day),
            method,
        );
        let is_insufficient = matches!(result, Err(LedgerError::InsufficientBasis { .. }));
        prop_assert!(is_insufficient);
        prop_assert_eq!(ledger, before);
    }

    #[test]
    fn prop_classify_boundary(start_day in 0i64..20_000, offset_ms in 0i64..MS_PER_DAY) {
        let acquired = TimeMs::new(start_day * MS_PER_DAY + offset_ms);
        let at_365 = TimeMs::new(acquired.as_ms() + 365 * MS_PER_DAY);
        let at_366 = TimeMs::new(acquired.as_ms() + 366 * MS_PER_DAY);
        let just_before_366 = TimeMs::new(at_366.as_ms() - 1);

        prop_assert_eq!(classify(acquired, at_365), Term::Short);
        prop_assert_eq!(classify(acquired, just_before_366), Term::Short);
        prop_assert_eq!(classify(acquired, at_366), Term::Long);
        prop_assert_eq!(classify(acquired, at_366), classify(acquired, at_366));
    }
}
