//! Transition executor.
//!
//! The single authorised mutation point. Every transition runs the same pipeline:
//!
//! 1. permission gate (fails fast, the entity is not read);
//! 2. authoritative fetch;
//! 3. stale check against the caller's assumed status;
//! 4. idempotent no-op or transition-table check;
//! 5. transition-specific validation;
//! 6. version compare-and-swap in the store;
//! 7. return the new authoritative entity.
//!
//! The executor performs no retries.

use crate::config::ClinicConfig;
use crate::consistency::PatientWorkload;
use crate::error::{TransitionError, TransitionResult};
use crate::lifecycle::{
    Bill, Collection, LabOrder, Lifecycle, MedicalRecord, NewBill, NewLabOrder,
    NewMedicalRecord, StatusBearing, TransitionAction,
};
use crate::permissions::{Actor, Capability, PermissionGate};
use crate::query::ListFilter;
use crate::store::{EntityStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct TransitionExecutor {
    store: Arc<dyn EntityStore>,
    cfg: Arc<ClinicConfig>,
}

impl TransitionExecutor {
    pub fn new(store: Arc<dyn EntityStore>, cfg: Arc<ClinicConfig>) -> Self {
        Self { store, cfg }
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.cfg
    }

    /// Reads one entity from the store.
    pub async fn get<E: StatusBearing>(&self, id: Uuid) -> TransitionResult<E> {
        let value = self
            .store
            .fetch(E::COLLECTION, id)
            .await?
            .ok_or(TransitionError::NotFound {
                collection: E::COLLECTION,
                id,
            })?;
        Ok(serde_json::from_value(value).map_err(StoreError::from)?)
    }

    /// Full snapshot of a collection, oldest first.
    pub async fn list<E: StatusBearing>(&self, filter: &ListFilter) -> TransitionResult<Vec<E>> {
        let mut entities = Vec::new();
        for value in self.store.list(E::COLLECTION).await? {
            match serde_json::from_value::<E>(value) {
                Ok(entity) if filter.matches(&entity) => entities.push(entity),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping malformed {} entry: {e}", E::COLLECTION),
            }
        }
        entities.sort_by(|a, b| {
            a.meta()
                .created_at
                .cmp(&b.meta().created_at)
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(entities)
    }

    /// Applies `action` to the entity `id`, which the caller believes is in `expected`.
    ///
    /// # Errors
    ///
    /// - [`TransitionError::PermissionDenied`] if the actor lacks the action's capability;
    ///   the store is not consulted.
    /// - [`TransitionError::NotFound`] if the entity does not exist.
    /// - [`TransitionError::StaleState`] if `expected` differs from the stored status, or a
    ///   concurrent writer won the compare-and-swap.
    /// - [`TransitionError::IllegalTransition`] if the transition table has no such edge, or a
    ///   single-shot action is repeated.
    /// - [`TransitionError::ValidationFailed`] if the payload is incomplete.
    /// - [`TransitionError::Storage`] on store failures.
    pub async fn transition<E: StatusBearing>(
        &self,
        actor: &Actor,
        id: Uuid,
        expected: E::Status,
        action: E::Action,
    ) -> TransitionResult<E> {
        PermissionGate::authorize(actor, action.capability())?;

        let current: E = self.get(id).await?;
        let from = current.status();
        let to = action.target();

        if from != expected {
            tracing::warn!(
                collection = %E::COLLECTION,
                %id,
                %expected,
                actual = %from,
                "stale transition request"
            );
            return Err(TransitionError::StaleState {
                expected: expected.as_str().into(),
                actual: from.as_str().into(),
            });
        }

        if from == to {
            if action.is_single_shot() {
                return Err(illegal::<E>(from, to));
            }
            tracing::debug!(collection = %E::COLLECTION, %id, status = %from, "no-op transition");
            return Ok(current);
        }

        if !from.can_transition(to) {
            tracing::warn!(collection = %E::COLLECTION, %id, %from, %to, "illegal transition");
            return Err(illegal::<E>(from, to));
        }

        current.validate(&action)?;

        let expected_version = current.version();
        let mut next = current;
        next.commit(action, actor, Utc::now());

        let value = serde_json::to_value(&next).map_err(StoreError::from)?;
        let swapped = self
            .store
            .compare_and_swap(E::COLLECTION, id, expected_version, value)
            .await?;
        if !swapped {
            tracing::warn!(collection = %E::COLLECTION, %id, "lost concurrent transition race");
            // A row deleted in the meantime surfaces as NotFound from the re-read.
            let winner: E = self.get(id).await?;
            return Err(TransitionError::StaleState {
                expected: expected.as_str().into(),
                actual: winner.status().as_str().into(),
            });
        }

        tracing::info!(
            collection = %E::COLLECTION,
            %id,
            %from,
            %to,
            actor = %actor.id(),
            role = %actor.role(),
            version = next.version(),
            "transition accepted"
        );
        Ok(next)
    }

    async fn insert<E: StatusBearing>(&self, entity: &E) -> TransitionResult<()> {
        let value = serde_json::to_value(entity).map_err(StoreError::from)?;
        self.store.insert(E::COLLECTION, entity.id(), value).await?;
        tracing::info!(collection = %E::COLLECTION, id = %entity.id(), "created");
        Ok(())
    }

    /// Orders a lab test in `ordered` state.
    pub async fn create_lab_order(
        &self,
        actor: &Actor,
        input: NewLabOrder,
    ) -> TransitionResult<LabOrder> {
        PermissionGate::authorize(actor, Capability::OrderLabTest)?;
        let order = LabOrder::new(input, actor, Utc::now());
        self.insert(&order).await?;
        Ok(order)
    }

    /// Records a consultation and its prescriptions in one write.
    pub async fn create_medical_record(
        &self,
        actor: &Actor,
        input: NewMedicalRecord,
    ) -> TransitionResult<MedicalRecord> {
        PermissionGate::authorize(actor, Capability::CreateMedicalRecord)?;
        let record = MedicalRecord::new(input, actor, Utc::now());
        self.insert(&record).await?;
        Ok(record)
    }

    /// Raises a bill with totals computed at the configured GST rate.
    pub async fn create_bill(&self, actor: &Actor, input: NewBill) -> TransitionResult<Bill> {
        PermissionGate::authorize(actor, Capability::CreateInvoice)?;
        let bill = Bill::new(input, self.cfg.gst_rate_bps(), actor, Utc::now())?;
        self.insert(&bill).await?;
        Ok(bill)
    }

    /// Hard-deletes a bill. Bills are the only entity with a delete path.
    pub async fn delete_bill(&self, actor: &Actor, id: Uuid) -> TransitionResult<()> {
        PermissionGate::authorize(actor, Capability::DeleteInvoice)?;
        if !self.store.delete(Collection::Bills, id).await? {
            return Err(TransitionError::NotFound {
                collection: Collection::Bills,
                id,
            });
        }
        tracing::info!(%id, actor = %actor.id(), "bill deleted");
        Ok(())
    }

    /// Outstanding lab orders, prescriptions and bills for one patient.
    pub async fn patient_workload(&self, patient_id: Uuid) -> TransitionResult<PatientWorkload> {
        let filter = ListFilter::for_patient(patient_id);
        let lab_orders = self.list::<LabOrder>(&filter).await?;
        let records = self.list::<MedicalRecord>(&filter).await?;
        let bills = self.list::<Bill>(&filter).await?;
        Ok(PatientWorkload::summarise(
            patient_id,
            &lab_orders,
            &records,
            &bills,
        ))
    }
}

fn illegal<E: StatusBearing>(from: E::Status, to: E::Status) -> TransitionError {
    TransitionError::IllegalTransition {
        collection: E::COLLECTION,
        from: from.as_str().into(),
        to: to.as_str().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{
        BillAction, BillStatus, LabOrderAction, LabOrderStatus, LabParameter, LabPriority,
        LabResultPayload, NewBillItem, PrescriptionAction, PrescriptionLine, PrescriptionStatus,
    };
    use crate::permissions::Role;
    use crate::store::{InMemoryStore, StoreResult};
    use async_trait::async_trait;
    use clinic_types::{Money, NonEmptyText};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts reads so tests can prove the gate short-circuits. Can also delete a row just
    /// before it is swapped, as a concurrent admin delete would.
    #[derive(Debug, Default)]
    struct CountingStore {
        inner: InMemoryStore,
        fetches: AtomicUsize,
        delete_before_swap: AtomicBool,
    }

    #[async_trait]
    impl EntityStore for CountingStore {
        async fn fetch(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(collection, id).await
        }

        async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
            self.inner.list(collection).await
        }

        async fn insert(&self, collection: Collection, id: Uuid, value: Value) -> StoreResult<()> {
            self.inner.insert(collection, id, value).await
        }

        async fn compare_and_swap(
            &self,
            collection: Collection,
            id: Uuid,
            expected_version: u64,
            value: Value,
        ) -> StoreResult<bool> {
            if self.delete_before_swap.load(Ordering::SeqCst) {
                self.inner.delete(collection, id).await?;
            }
            self.inner
                .compare_and_swap(collection, id, expected_version, value)
                .await
        }

        async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool> {
            self.inner.delete(collection, id).await
        }
    }

    fn setup() -> (TransitionExecutor, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        let executor = TransitionExecutor::new(store.clone(), Arc::new(ClinicConfig::default()));
        (executor, store)
    }

    fn actor(id: &str, role: Role) -> Actor {
        Actor::new(NonEmptyText::new(id).unwrap(), role)
    }

    fn doctor() -> Actor {
        actor("dr-asha", Role::Doctor)
    }

    fn tech() -> Actor {
        actor("tech-ravi", Role::LabTechnician)
    }

    fn pharmacist() -> Actor {
        actor("ph-meena", Role::Pharmacist)
    }

    fn reception() -> Actor {
        actor("desk-1", Role::Reception)
    }

    fn admin() -> Actor {
        actor("admin", Role::Admin)
    }

    fn hemoglobin() -> LabResultPayload {
        LabResultPayload {
            parameters: vec![LabParameter {
                name: NonEmptyText::new("Hemoglobin").unwrap(),
                value: "13.5".into(),
                unit: Some("g/dL".into()),
                reference_range: None,
            }],
            attachments: vec![],
        }
    }

    async fn lab_order(executor: &TransitionExecutor, patient_id: Uuid) -> LabOrder {
        executor
            .create_lab_order(
                &doctor(),
                NewLabOrder {
                    patient_id,
                    test_name: NonEmptyText::new("Complete Blood Count").unwrap(),
                    test_code: NonEmptyText::new("CBC").unwrap(),
                    priority: LabPriority::Stat,
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    async fn processing_order(executor: &TransitionExecutor) -> LabOrder {
        let order = lab_order(executor, Uuid::new_v4()).await;
        executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Ordered,
                LabOrderAction::CollectSample,
            )
            .await
            .unwrap();
        executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::SampleCollected,
                LabOrderAction::StartProcessing,
            )
            .await
            .unwrap()
    }

    async fn record(executor: &TransitionExecutor, patient_id: Uuid) -> MedicalRecord {
        executor
            .create_medical_record(
                &doctor(),
                NewMedicalRecord {
                    patient_id,
                    diagnosis: Some("Tonsillitis".into()),
                    prescriptions: vec![PrescriptionLine {
                        medicine_name: NonEmptyText::new("Amoxicillin").unwrap(),
                        dosage: NonEmptyText::new("500mg").unwrap(),
                        frequency: NonEmptyText::new("three times daily").unwrap(),
                        duration: NonEmptyText::new("7 days").unwrap(),
                        instructions: Some("after food".into()),
                    }],
                },
            )
            .await
            .unwrap()
    }

    async fn bill(executor: &TransitionExecutor, patient_id: Uuid) -> Bill {
        executor
            .create_bill(
                &reception(),
                NewBill {
                    patient_id,
                    items: vec![NewBillItem {
                        description: NonEmptyText::new("Consultation").unwrap(),
                        quantity: 1,
                        unit_price: Money::from_minor(50_000).unwrap(),
                        medicine_id: None,
                    }],
                    discount: Money::ZERO,
                    initial_payment: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stat_order_round_trip_to_completed() {
        let (executor, _) = setup();
        let order = processing_order(&executor).await;
        assert_eq!(order.priority, LabPriority::Stat);

        let completed = executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Processing,
                LabOrderAction::SubmitResult(hemoglobin()),
            )
            .await
            .unwrap();
        assert_eq!(completed.status, LabOrderStatus::Completed);

        let stored: LabOrder = executor.get(order.id).await.unwrap();
        assert_eq!(stored.status, LabOrderStatus::Completed);
        let result = stored.result.expect("completed orders carry a result");
        assert_eq!(result.parameters.len(), 1);
        assert_eq!(result.parameters[0].name.as_str(), "Hemoglobin");
        assert_eq!(stored.meta.version, 4);
        assert_eq!(stored.meta.history.len(), 3);
    }

    #[tokio::test]
    async fn empty_result_is_rejected_and_status_kept() {
        let (executor, _) = setup();
        let order = processing_order(&executor).await;

        let err = executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Processing,
                LabOrderAction::SubmitResult(LabResultPayload::default()),
            )
            .await
            .expect_err("empty result");
        assert!(matches!(err, TransitionError::ValidationFailed(_)));

        let stored: LabOrder = executor.get(order.id).await.unwrap();
        assert_eq!(stored.status, LabOrderStatus::Processing);
        assert!(stored.result.is_none());
        assert_eq!(stored.meta.version, order.meta.version);
    }

    #[tokio::test]
    async fn illegal_transitions_leave_store_untouched() {
        let (executor, _) = setup();
        let order = lab_order(&executor, Uuid::new_v4()).await;

        let err = executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Ordered,
                LabOrderAction::SubmitResult(hemoglobin()),
            )
            .await
            .expect_err("cannot complete an unsampled order");
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));

        let rec = record(&executor, Uuid::new_v4()).await;
        executor
            .transition::<MedicalRecord>(
                &pharmacist(),
                rec.id,
                PrescriptionStatus::Pending,
                PrescriptionAction::Cancel,
            )
            .await
            .unwrap();
        let err = executor
            .transition::<MedicalRecord>(
                &pharmacist(),
                rec.id,
                PrescriptionStatus::Cancelled,
                PrescriptionAction::Dispense,
            )
            .await
            .expect_err("cancelled prescriptions cannot be dispensed");
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));

        let b = bill(&executor, Uuid::new_v4()).await;
        executor
            .transition::<Bill>(&admin(), b.id, BillStatus::Pending, BillAction::Cancel)
            .await
            .unwrap();
        let err = executor
            .transition::<Bill>(
                &reception(),
                b.id,
                BillStatus::Cancelled,
                BillAction::ConfirmPayment,
            )
            .await
            .expect_err("cancelled bills cannot be paid");
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));

        let stored_order: LabOrder = executor.get(order.id).await.unwrap();
        assert_eq!(stored_order.status, LabOrderStatus::Ordered);
        assert_eq!(stored_order.meta.version, 1);
        let stored_bill: Bill = executor.get(b.id).await.unwrap();
        assert_eq!(stored_bill.status, BillStatus::Cancelled);
        assert!(stored_bill.paid_amount.is_none());
    }

    #[tokio::test]
    async fn permission_denied_skips_store() {
        let (executor, store) = setup();
        let order = lab_order(&executor, Uuid::new_v4()).await;
        let rec = record(&executor, Uuid::new_v4()).await;
        let b = bill(&executor, Uuid::new_v4()).await;
        let before = store.fetches.load(Ordering::SeqCst);

        let denied = [
            executor
                .transition::<LabOrder>(
                    &doctor(),
                    order.id,
                    LabOrderStatus::Ordered,
                    LabOrderAction::CollectSample,
                )
                .await
                .map(|_| ()),
            executor
                .transition::<MedicalRecord>(
                    &doctor(),
                    rec.id,
                    PrescriptionStatus::Pending,
                    PrescriptionAction::Dispense,
                )
                .await
                .map(|_| ()),
            executor
                .transition::<Bill>(&pharmacist(), b.id, BillStatus::Pending, BillAction::ConfirmPayment)
                .await
                .map(|_| ()),
            executor
                .transition::<Bill>(&reception(), b.id, BillStatus::Pending, BillAction::Cancel)
                .await
                .map(|_| ()),
            executor.delete_bill(&reception(), b.id).await,
        ];

        for result in denied {
            assert!(matches!(
                result,
                Err(TransitionError::PermissionDenied { .. })
            ));
        }
        assert_eq!(store.fetches.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn permission_is_checked_before_legality() {
        let (executor, _) = setup();
        let order = processing_order(&executor).await;
        // Illegal for anyone, but a doctor must hear "denied", not "illegal".
        let err = executor
            .transition::<LabOrder>(
                &doctor(),
                order.id,
                LabOrderStatus::Processing,
                LabOrderAction::CollectSample,
            )
            .await
            .expect_err("denied");
        assert!(matches!(err, TransitionError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn paying_a_paid_bill_is_a_no_op() {
        let (executor, _) = setup();
        let b = bill(&executor, Uuid::new_v4()).await;
        let paid = executor
            .transition::<Bill>(&reception(), b.id, BillStatus::Pending, BillAction::ConfirmPayment)
            .await
            .unwrap();
        assert_eq!(paid.paid_amount, Some(paid.grand_total));

        let again = executor
            .transition::<Bill>(&reception(), b.id, BillStatus::Paid, BillAction::ConfirmPayment)
            .await
            .unwrap();
        assert_eq!(again.paid_amount, paid.paid_amount);
        assert_eq!(again.paid_at, paid.paid_at);
        assert_eq!(again.meta.version, paid.meta.version);
    }

    #[tokio::test]
    async fn dispensing_happens_at_most_once() {
        let (executor, _) = setup();
        let rec = record(&executor, Uuid::new_v4()).await;

        let dispensed = executor
            .transition::<MedicalRecord>(
                &pharmacist(),
                rec.id,
                PrescriptionStatus::Pending,
                PrescriptionAction::Dispense,
            )
            .await
            .unwrap();
        assert_eq!(dispensed.prescription_status, PrescriptionStatus::Dispensed);
        assert_eq!(dispensed.dispensed_by.as_deref(), Some("ph-meena"));

        let err = executor
            .transition::<MedicalRecord>(
                &pharmacist(),
                rec.id,
                PrescriptionStatus::Dispensed,
                PrescriptionAction::Dispense,
            )
            .await
            .expect_err("no re-dispensing");
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));

        let stored: MedicalRecord = executor.get(rec.id).await.unwrap();
        assert_eq!(stored.meta.version, dispensed.meta.version);
    }

    #[tokio::test]
    async fn cancelling_twice_is_idempotent() {
        let (executor, _) = setup();
        let order = lab_order(&executor, Uuid::new_v4()).await;
        let cancelled = executor
            .transition::<LabOrder>(&tech(), order.id, LabOrderStatus::Ordered, LabOrderAction::Cancel)
            .await
            .unwrap();
        let again = executor
            .transition::<LabOrder>(&tech(), order.id, LabOrderStatus::Cancelled, LabOrderAction::Cancel)
            .await
            .unwrap();
        assert_eq!(again.meta.version, cancelled.meta.version);
        assert!(again.result.is_none());
    }

    #[tokio::test]
    async fn wrong_assumed_status_is_stale() {
        let (executor, _) = setup();
        let order = processing_order(&executor).await;
        let err = executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Ordered,
                LabOrderAction::Cancel,
            )
            .await
            .expect_err("caller is behind");
        match err {
            TransitionError::StaleState { expected, actual } => {
                assert_eq!(expected, "ordered");
                assert_eq!(actual, "in_progress");
            }
            other => panic!("expected StaleState, got {other:?}"),
        }
        let stored: LabOrder = executor.get(order.id).await.unwrap();
        assert_eq!(stored.status, LabOrderStatus::Processing);
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let (executor, _) = setup();
        let err = executor
            .transition::<Bill>(
                &reception(),
                Uuid::new_v4(),
                BillStatus::Pending,
                BillAction::ConfirmPayment,
            )
            .await
            .expect_err("missing");
        assert!(matches!(err, TransitionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn row_deleted_mid_transition_is_not_found() {
        let (executor, store) = setup();
        let b = bill(&executor, Uuid::new_v4()).await;
        store.delete_before_swap.store(true, Ordering::SeqCst);

        let err = executor
            .transition::<Bill>(&reception(), b.id, BillStatus::Pending, BillAction::ConfirmPayment)
            .await
            .expect_err("deleted underneath");
        assert!(matches!(err, TransitionError::NotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn concurrent_payments_apply_once() {
        let (executor, _) = setup();
        let b = bill(&executor, Uuid::new_v4()).await;
        let desk_a = actor("desk-a", Role::Reception);
        let desk_b = actor("desk-b", Role::Reception);

        let (first, second) = tokio::join!(
            executor.transition::<Bill>(&desk_a, b.id, BillStatus::Pending, BillAction::ConfirmPayment),
            executor.transition::<Bill>(&desk_b, b.id, BillStatus::Pending, BillAction::ConfirmPayment),
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in [&first, &second] {
            if let Err(err) = result {
                assert!(matches!(err, TransitionError::StaleState { .. }), "{err:?}");
            }
        }

        let stored: Bill = executor.get(b.id).await.unwrap();
        assert_eq!(stored.status, BillStatus::Paid);
        assert_eq!(stored.paid_amount, Some(stored.grand_total));
        assert_eq!(stored.meta.version, 2);
        assert_eq!(stored.meta.history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_payments_across_threads_apply_once() {
        let (executor, _) = setup();
        let b = bill(&executor, Uuid::new_v4()).await;

        let mut handles = Vec::new();
        for n in 0..8 {
            let executor = executor.clone();
            let desk = actor(&format!("desk-{n}"), Role::Reception);
            handles.push(tokio::spawn(async move {
                executor
                    .transition::<Bill>(&desk, b.id, BillStatus::Pending, BillAction::ConfirmPayment)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(TransitionError::StaleState { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        let stored: Bill = executor.get(b.id).await.unwrap();
        assert_eq!(stored.meta.version, 2);
    }

    #[tokio::test]
    async fn admin_cancels_paid_bill_and_deletes() {
        let (executor, _) = setup();
        let b = bill(&executor, Uuid::new_v4()).await;
        executor
            .transition::<Bill>(&reception(), b.id, BillStatus::Pending, BillAction::ConfirmPayment)
            .await
            .unwrap();
        let cancelled = executor
            .transition::<Bill>(&admin(), b.id, BillStatus::Paid, BillAction::Cancel)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BillStatus::Cancelled);

        executor.delete_bill(&admin(), b.id).await.unwrap();
        let err = executor.get::<Bill>(b.id).await.expect_err("deleted");
        assert!(matches!(err, TransitionError::NotFound { .. }));
        let err = executor.delete_bill(&admin(), b.id).await.expect_err("gone");
        assert!(matches!(err, TransitionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn creation_is_gated() {
        let (executor, _) = setup();
        let err = executor
            .create_lab_order(
                &reception(),
                NewLabOrder {
                    patient_id: Uuid::new_v4(),
                    test_name: NonEmptyText::new("CBC").unwrap(),
                    test_code: NonEmptyText::new("CBC").unwrap(),
                    priority: LabPriority::Routine,
                    notes: None,
                },
            )
            .await
            .expect_err("reception cannot order tests");
        assert!(matches!(err, TransitionError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_patient_and_status() {
        let (executor, _) = setup();
        let patient = Uuid::new_v4();
        let first = lab_order(&executor, patient).await;
        lab_order(&executor, patient).await;
        lab_order(&executor, Uuid::new_v4()).await;
        executor
            .transition::<LabOrder>(&tech(), first.id, LabOrderStatus::Ordered, LabOrderAction::CollectSample)
            .await
            .unwrap();

        let all: Vec<LabOrder> = executor.list(&ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let mine: Vec<LabOrder> = executor.list(&ListFilter::for_patient(patient)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, first.id);

        let collected: Vec<LabOrder> = executor
            .list(&ListFilter::for_patient(patient).with_status("sample_collected"))
            .await
            .unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].id, first.id);
    }

    #[tokio::test]
    async fn lab_completion_and_dispensing_leave_bills_alone() {
        let (executor, _) = setup();
        let patient = Uuid::new_v4();
        let b = bill(&executor, patient).await;
        let rec = record(&executor, patient).await;

        let order = processing_order(&executor).await;
        executor
            .transition::<LabOrder>(
                &tech(),
                order.id,
                LabOrderStatus::Processing,
                LabOrderAction::SubmitResult(hemoglobin()),
            )
            .await
            .unwrap();
        executor
            .transition::<MedicalRecord>(
                &pharmacist(),
                rec.id,
                PrescriptionStatus::Pending,
                PrescriptionAction::Dispense,
            )
            .await
            .unwrap();

        let stored: Bill = executor.get(b.id).await.unwrap();
        assert_eq!(stored, b);
    }

    #[tokio::test]
    async fn cancelling_a_bill_leaves_clinical_work_alone() {
        let (executor, _) = setup();
        let patient = Uuid::new_v4();
        let b = bill(&executor, patient).await;
        let rec = record(&executor, patient).await;
        let order = lab_order(&executor, patient).await;

        executor
            .transition::<Bill>(&admin(), b.id, BillStatus::Pending, BillAction::Cancel)
            .await
            .unwrap();

        let stored_rec: MedicalRecord = executor.get(rec.id).await.unwrap();
        let stored_order: LabOrder = executor.get(order.id).await.unwrap();
        assert_eq!(stored_rec, rec);
        assert_eq!(stored_order, order);
    }

    #[tokio::test]
    async fn workload_projects_each_lifecycle_independently() {
        let (executor, _) = setup();
        let patient = Uuid::new_v4();
        let order = lab_order(&executor, patient).await;
        let rec = record(&executor, patient).await;
        let b = bill(&executor, patient).await;
        bill(&executor, Uuid::new_v4()).await;

        let workload = executor.patient_workload(patient).await.unwrap();
        assert_eq!(workload.open_lab_orders, vec![order.id]);
        assert_eq!(workload.pending_prescriptions, vec![rec.id]);
        assert_eq!(workload.unpaid_bills, vec![b.id]);
        assert_eq!(workload.amount_due, b.grand_total);

        executor
            .transition::<Bill>(&reception(), b.id, BillStatus::Pending, BillAction::ConfirmPayment)
            .await
            .unwrap();
        let workload = executor.patient_workload(patient).await.unwrap();
        assert!(workload.unpaid_bills.is_empty());
        assert!(workload.amount_due.is_zero());
        assert_eq!(workload.open_lab_orders, vec![order.id]);
        assert_eq!(workload.pending_prescriptions, vec![rec.id]);
    }
}
