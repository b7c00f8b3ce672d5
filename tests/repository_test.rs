use bitbasis::db::init_db;
use bitbasis::domain::{
    Decimal, Disposal, DisposalId, Lot, LotId, RealizedGainFragment, TaxMethod, Term, TimeMs,
    UserId,
};
use bitbasis::store::{DisposalCommit, LotRepository, LotUpdate, StoreError};
use bitbasis::{LedgerError, LedgerService, Repository, ServiceError};
use std::sync::Arc;
use tempfile::TempDir;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn user() -> UserId {
    UserId::new("hodler")
}

async fn setup_repo() -> (Repository, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("nested")
        .join("ledger.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Repository::new(pool), temp_dir)
}

fn lot(id: &str, qty: &str, cost: &str, y: i32, m: u32, day: u32) -> Lot {
    Lot::new(
        LotId::new(id),
        user(),
        d(qty),
        d(cost),
        TimeMs::from_ymd(y, m, day).unwrap(),
    )
}

#[tokio::test]
async fn test_lots_roundtrip_with_exact_decimals() {
    let (repo, _temp) = setup_repo().await;
    let original = lot("a", "0.12345678", "43210.99", 2023, 3, 14);
    repo.insert_lot(&original).await.unwrap();
    repo.insert_lot(&lot("b", "1", "1", 2022, 1, 1)).await.unwrap();

    let lots = repo.load_lots(&user()).await.unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0].id, LotId::new("b"));
    assert_eq!(lots[1], original);
    assert_eq!(lots[1].quantity.to_canonical_string(), "0.12345678");

    let err = repo.insert_lot(&original).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));

    assert!(repo.load_lots(&UserId::new("someone-else")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_open_lots_respects_as_of_and_remaining() {
    let (repo, _temp) = setup_repo().await;
    repo.insert_lot(&lot("old", "1", "1", 2022, 1, 1)).await.unwrap();
    repo.insert_lot(&lot("new", "1", "1", 2024, 1, 1)).await.unwrap();
    repo.update_lot_remaining(&LotId::new("old"), d("1"), d("0"))
        .await
        .unwrap();

    let as_of = TimeMs::from_ymd(2025, 1, 1).unwrap();
    let open = repo.load_open_lots(&user(), as_of).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, LotId::new("new"));

    let earlier = TimeMs::from_ymd(2023, 1, 1).unwrap();
    assert!(repo.load_open_lots(&user(), earlier).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_lot_remaining_is_compare_and_swap() {
    let (repo, _temp) = setup_repo().await;
    repo.insert_lot(&lot("a", "2", "1", 2022, 1, 1)).await.unwrap();

    repo.update_lot_remaining(&LotId::new("a"), d("2"), d("1.5"))
        .await
        .unwrap();

    let stale = repo
        .update_lot_remaining(&LotId::new("a"), d("2"), d("1"))
        .await
        .unwrap_err();
    assert!(matches!(stale, StoreError::Conflict(_)));

    let missing = repo
        .update_lot_remaining(&LotId::new("nope"), d("1"), d("0"))
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_save_fragments_is_idempotent() {
    let (repo, _temp) = setup_repo().await;
    let acquired = lot("a", "1", "100", 2022, 1, 1);
    repo.insert_lot(&acquired).await.unwrap();

    let disposal = Disposal::new(
        DisposalId::new("x"),
        user(),
        d("0.5"),
        d("300"),
        TimeMs::from_ymd(2024, 1, 1).unwrap(),
    );
    let fragment = RealizedGainFragment::new(
        &acquired,
        &disposal,
        TaxMethod::Fifo,
        d("0.5"),
        730,
        Term::Long,
    );

    assert_eq!(repo.save_fragments(&[fragment.clone()]).await.unwrap(), 1);
    assert_eq!(repo.save_fragments(&[fragment.clone()]).await.unwrap(), 0);

    let stored = repo.load_fragments(&user(), None, None).await.unwrap();
    assert_eq!(stored, vec![fragment]);
}

#[tokio::test]
async fn test_commit_disposal_rolls_back_on_conflict() {
    let (repo, _temp) = setup_repo().await;
    let a = lot("a", "1", "100", 2022, 1, 1);
    let b = lot("b", "1", "200", 2022, 2, 1);
    repo.insert_lot(&a).await.unwrap();
    repo.insert_lot(&b).await.unwrap();

    let disposal = Disposal::new(
        DisposalId::new("x"),
        user(),
        d("2"),
        d("300"),
        TimeMs::from_ymd(2024, 1, 1).unwrap(),
    );
    let commit = DisposalCommit {
        disposal: disposal.clone(),
        fragments: vec![
            RealizedGainFragment::new(&a, &disposal, TaxMethod::Fifo, d("1"), 730, Term::Long),
            RealizedGainFragment::new(&b, &disposal, TaxMethod::Fifo, d("1"), 699, Term::Long),
        ],
        lot_updates: vec![
            LotUpdate {
                lot_id: LotId::new("a"),
                expected_remaining: d("1"),
                new_remaining: d("0"),
            },
            LotUpdate {
                lot_id: LotId::new("b"),
                // Stale: someone else already touched this lot.
                expected_remaining: d("0.7"),
                new_remaining: d("0"),
            },
        ],
    };

    let err = repo.commit_disposal(&commit).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(ref id) if id == &LotId::new("b")));

    let lots = repo.load_lots(&user()).await.unwrap();
    assert!(lots.iter().all(|l| l.remaining_quantity == d("1")));
    assert!(repo.load_fragments(&user(), None, None).await.unwrap().is_empty());
    assert!(repo.load_disposals(&user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_service_over_sqlite() {
    let (repo, _temp) = setup_repo().await;
    let store: Arc<dyn LotRepository> = Arc::new(repo);
    let service = LedgerService::new(store.clone());

    service.add_lot(lot("lot1", "10", "10000", 2022, 1, 1)).await.unwrap();
    service.add_lot(lot("lot2", "5", "30000", 2023, 6, 1)).await.unwrap();

    let sell_at = TimeMs::from_ymd(2024, 1, 2).unwrap();
    let fragments = service
        .dispose(
            Disposal::new(DisposalId::new("s1"), user(), d("12"), d("50000"), sell_at),
            TaxMethod::Fifo,
        )
        .await
        .unwrap();
    assert_eq!(fragments.len(), 2);

    // Replaying the same disposal id is rejected and changes nothing.
    let again = service
        .dispose(
            Disposal::new(DisposalId::new("s1"), user(), d("1"), d("50000"), sell_at),
            TaxMethod::Fifo,
        )
        .await
        .unwrap_err();
    assert!(matches!(again, ServiceError::Store(StoreError::Duplicate(_))));

    let too_much = service
        .dispose(
            Disposal::new(DisposalId::new("s2"), user(), d("3.1"), d("50000"), sell_at),
            TaxMethod::Fifo,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        too_much,
        ServiceError::Ledger(LedgerError::InsufficientBasis { .. })
    ));

    let view = service.open_lots(&user(), sell_at).await.unwrap();
    assert_eq!(view.summary.open_quantity, d("3"));
    assert_eq!(view.lots[0].id, LotId::new("lot2"));

    let stored = store.load_fragments(&user(), None, Some(sell_at)).await.unwrap();
    assert_eq!(stored, fragments);
    let total: Decimal = stored.iter().map(|f| f.quantity_matched).sum();
    assert_eq!(total, d("12"));
}

#[tokio::test]
async fn test_init_db_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("twice.db").to_string_lossy().to_string();

    let pool = init_db(&db_path).await.unwrap();
    let repo = Repository::new(pool.clone());
    repo.insert_lot(&lot("a", "1", "1", 2022, 1, 1)).await.unwrap();
    pool.close().await;

    let repo = Repository::new(init_db(&db_path).await.unwrap());
    assert_eq!(repo.load_lots(&user()).await.unwrap().len(), 1);
}
