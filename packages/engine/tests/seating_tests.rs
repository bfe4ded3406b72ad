mod common;

use common::{TestResult, harness};
use db::repositories::{GeneralRepository, NewGuest, TableRepository, TicketRepository};
use engine::EngineError;
use ticket_core::{Classify, ErrorKind, Occupant};

#[tokio::test]
async fn reassigning_moves_seats_between_tables() -> TestResult {
    let h = harness().await?;
    let t1 = h.seating.create_table("Mesa 1", 4).await?;
    let t2 = h.seating.create_table("Mesa 2", 3).await?;
    let family = h.seating.register_guest(NewGuest::new("Familia Ruiz", 2)).await?;
    let family = Occupant::Guest(family.id);

    let seated = h.seating.assign(family, t1.id).await?;
    assert_eq!(seated.capacity, 1);
    assert_eq!(TableRepository::get(h.db.client(), t1.id).await?.capacity, 1);

    h.seating.assign(family, t2.id).await?;
    assert_eq!(TableRepository::get(h.db.client(), t1.id).await?.capacity, 4);
    assert_eq!(TableRepository::get(h.db.client(), t2.id).await?.capacity, 0);

    let again = h.seating.assign(family, t2.id).await;
    assert!(matches!(again, Err(EngineError::AlreadyAssigned { .. })));

    h.seating.unassign(family).await?;
    assert_eq!(TableRepository::get(h.db.client(), t2.id).await?.capacity, 3);

    let not_seated = h.seating.unassign(family).await;
    assert!(matches!(not_seated, Err(EngineError::NotAssigned(_))));
    Ok(())
}

#[tokio::test]
async fn insufficient_capacity_changes_nothing() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa chica", 2).await?;
    let other = h.seating.create_table("Mesa grande", 10).await?;
    let guest = h.seating.register_guest(NewGuest::new("Grupo Díaz", 3)).await?;
    let occupant = Occupant::Guest(guest.id);
    h.seating.assign(occupant, other.id).await?;

    let err = h.seating.assign(occupant, table.id).await;
    match err {
        Err(EngineError::InsufficientCapacity {
            table_id,
            needed,
            available,
        }) => {
            assert_eq!(table_id, table.id);
            assert_eq!(needed, 4);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientCapacity, got {other:?}"),
    }

    assert_eq!(TableRepository::get(h.db.client(), table.id).await?.capacity, 2);
    assert_eq!(TableRepository::get(h.db.client(), other.id).await?.capacity, 6);
    let plan = h.seating.seating_plan().await?;
    let big = plan.iter().find(|s| s.table.id == other.id).map(|s| s.guests.len());
    assert_eq!(big, Some(1));
    Ok(())
}

#[tokio::test]
async fn generals_get_the_already_assigned_guard() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 5", 5).await?;
    let generals = h.issuance.generate_general_tickets(1).await?;
    let general = Occupant::General(generals[0].id);

    h.seating.assign(general, table.id).await?;
    let err = h.seating.assign(general, table.id).await;
    assert!(matches!(err, Err(EngineError::AlreadyAssigned { .. })));
    assert_eq!(TableRepository::get(h.db.client(), table.id).await?.capacity, 4);
    Ok(())
}

#[tokio::test]
async fn missing_occupant_or_table_is_not_found() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 1", 5).await?;
    let guest = h.seating.register_guest(NewGuest::new("Ana", 0)).await?;

    let err = h
        .seating
        .assign(Occupant::Guest(ticket_core::GuestId(999)), table.id)
        .await;
    assert!(matches!(&err, Err(e) if e.kind() == ErrorKind::NotFound));

    let err = h
        .seating
        .assign(Occupant::Guest(guest.id), ticket_core::TableId(999))
        .await;
    assert!(matches!(&err, Err(e) if e.kind() == ErrorKind::NotFound));
    Ok(())
}

#[tokio::test]
async fn seated_occupants_cannot_be_deleted() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 1", 5).await?;
    let guest = h.seating.register_guest(NewGuest::new("Luis", 1)).await?;
    h.seating.assign(Occupant::Guest(guest.id), table.id).await?;

    let err = h.seating.delete_guest(guest.id).await;
    assert!(matches!(err, Err(EngineError::OccupantSeated(_))));

    h.seating.unassign(Occupant::Guest(guest.id)).await?;
    h.seating.delete_guest(guest.id).await?;
    assert_eq!(TableRepository::get(h.db.client(), table.id).await?.capacity, 5);

    let err = h.seating.delete_guest(guest.id).await;
    assert!(matches!(err, Err(EngineError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn deleting_last_generals_is_all_or_nothing() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 9", 10).await?;
    let generals = h.issuance.generate_general_tickets(3).await?;
    let folio_two = generals
        .iter()
        .find(|g| g.folio == 2)
        .map(|g| g.id)
        .ok_or("folio 2 missing")?;
    h.seating.assign(Occupant::General(folio_two), table.id).await?;

    let err = h.seating.delete_last_generals(2).await;
    assert!(matches!(err, Err(EngineError::GeneralsSeated(1))));
    assert_eq!(GeneralRepository::count(h.db.client()).await?, 3);

    h.seating.unassign(Occupant::General(folio_two)).await?;
    let deleted = h.seating.delete_last_generals(2).await?;
    assert_eq!(deleted, vec![3, 2]);
    assert_eq!(GeneralRepository::count(h.db.client()).await?, 1);
    let tickets = TicketRepository::list_for(h.db.client(), Occupant::General(folio_two)).await?;
    assert!(tickets.is_empty());

    let err = h.seating.delete_last_generals(0).await;
    assert!(matches!(err, Err(EngineError::Invalid(_))));
    Ok(())
}

#[tokio::test]
async fn invalid_tables_and_guests_are_rejected() -> TestResult {
    let h = harness().await?;
    assert!(matches!(
        h.seating.create_table("Mesa", -1).await,
        Err(EngineError::Invalid(_))
    ));
    assert!(matches!(
        h.seating.register_guest(NewGuest::new("  ", 0)).await,
        Err(EngineError::Invalid(_))
    ));
    assert!(matches!(
        h.seating.register_guest(NewGuest::new("Eva", -2)).await,
        Err(EngineError::Invalid(_))
    ));

    h.seating.create_table("Mesa", 2).await?;
    let duplicate = h.seating.create_table("Mesa", 2).await;
    assert!(matches!(&duplicate, Err(e) if e.kind() == ErrorKind::Conflict));
    Ok(())
}

#[tokio::test]
async fn seating_plan_counts_companions() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 1", 10).await?;
    let guest = h.seating.register_guest(NewGuest::new("Marta", 2)).await?;
    let generals = h.issuance.generate_general_tickets(2).await?;

    h.seating.assign(Occupant::Guest(guest.id), table.id).await?;
    for general in &generals {
        h.seating.assign(Occupant::General(general.id), table.id).await?;
    }

    let plan = h.seating.seating_plan().await?;
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].seats_taken(), 5);
    assert_eq!(plan[0].table.capacity, 5);
    Ok(())
}

#[tokio::test]
async fn updating_guests() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 3", 6).await?;
    let guest = h.seating.register_guest(NewGuest::new("Rosa", 0)).await?;
    h.seating.register_guest(NewGuest::new("Jorge", 0)).await?;

    let updated = h
        .seating
        .update_guest(guest.id, NewGuest::new("Rosa  Elena", 2).confirmed())
        .await?;
    assert_eq!(updated.full_name, "Rosa Elena");
    assert_eq!(updated.seats_needed(), 3);
    assert!(updated.confirm_attendance);

    let taken = h.seating.update_guest(guest.id, NewGuest::new("jorge", 0)).await;
    assert!(matches!(&taken, Err(e) if e.kind() == ErrorKind::Conflict));
    let negative = h.seating.update_guest(guest.id, NewGuest::new("Rosa", -1)).await;
    assert!(matches!(negative, Err(EngineError::Invalid(_))));
    let missing = h
        .seating
        .update_guest(ticket_core::GuestId(999), NewGuest::new("Nadie", 0))
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));

    h.seating.assign(Occupant::Guest(guest.id), table.id).await?;
    let seated = h.seating.update_guest(guest.id, NewGuest::new("Rosa Elena", 5)).await;
    assert!(matches!(seated, Err(EngineError::OccupantSeated(_))));
    assert_eq!(TableRepository::get(h.db.client(), table.id).await?.capacity, 3);
    Ok(())
}

#[tokio::test]
async fn generated_tickets_fix_the_companions() -> TestResult {
    let h = harness().await?;
    let guest = h
        .seating
        .register_guest(NewGuest::new("Marta", 1).confirmed())
        .await?;
    h.issuance.generate_ticket(guest.id).await?;

    let more = h
        .seating
        .update_guest(guest.id, NewGuest::new("Marta", 3).confirmed())
        .await;
    assert!(matches!(more, Err(EngineError::TicketAlreadyGenerated(_))));

    let renamed = h
        .seating
        .update_guest(guest.id, NewGuest::new("Marta Solís", 1).confirmed())
        .await?;
    assert_eq!(renamed.full_name, "Marta Solís");
    assert!(renamed.ticket_generated);
    Ok(())
}

#[tokio::test]
async fn only_empty_tables_are_deleted() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa 9", 4).await?;
    let guest = h.seating.register_guest(NewGuest::new("Iván", 1)).await?;
    let generals = h.issuance.generate_general_tickets(1).await?;
    h.seating.assign(Occupant::Guest(guest.id), table.id).await?;
    h.seating.assign(Occupant::General(generals[0].id), table.id).await?;

    let err = h.seating.delete_table(table.id).await;
    match &err {
        Err(EngineError::TableOccupied { table_id, occupants }) => {
            assert_eq!(*table_id, table.id);
            assert_eq!(*occupants, 2);
        }
        other => panic!("expected TableOccupied, got {other:?}"),
    }
    assert!(matches!(&err, Err(e) if e.kind() == ErrorKind::Conflict));

    h.seating.unassign(Occupant::Guest(guest.id)).await?;
    h.seating.unassign(Occupant::General(generals[0].id)).await?;
    h.seating.delete_table(table.id).await?;
    assert!(TableRepository::find(h.db.client(), table.id).await?.is_none());

    let again = h.seating.delete_table(table.id).await;
    assert!(matches!(again, Err(EngineError::NotFound(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_never_oversell_a_table() -> TestResult {
    let h = harness().await?;
    let table = h.seating.create_table("Mesa disputada", 5).await?;

    let mut guests = Vec::new();
    for i in 0..8 {
        let guest = h
            .seating
            .register_guest(NewGuest::new(format!("Invitado {i}"), i % 2))
            .await?;
        guests.push(guest);
    }

    let attempts: Vec<_> = guests
        .iter()
        .map(|guest| {
            let seating = h.seating.clone();
            let occupant = Occupant::Guest(guest.id);
            let seats = guest.seats_needed();
            tokio::spawn(async move { (seats, seating.assign(occupant, table.id).await) })
        })
        .collect();

    let mut taken = 0;
    let mut refused = 0;
    for attempt in attempts {
        match attempt.await? {
            (seats, Ok(_)) => taken += seats,
            (_, Err(EngineError::InsufficientCapacity { .. })) => refused += 1,
            (_, Err(e)) => return Err(e.into()),
        }
    }

    let capacity = TableRepository::get(h.db.client(), table.id).await?.capacity;
    assert!(capacity >= 0);
    assert_eq!(capacity, 5 - taken);
    assert!(refused > 0);

    let plan = h.seating.seating_plan().await?;
    let seated = plan
        .iter()
        .find(|s| s.table.id == table.id)
        .map(|s| s.seats_taken())
        .ok_or("table missing from plan")?;
    assert_eq!(seated, taken);
    Ok(())
}
