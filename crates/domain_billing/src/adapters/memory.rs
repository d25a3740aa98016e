//! In-memory billing store
//!
//! Behaves like the relational store for everything the ledger relies on:
//!
//! - `lock_*` takes an exclusive per-row lock held until the unit ends, so a
//!   second unit touching the same row waits and then sees the committed
//!   state
//! - writes are staged inside the unit and become visible only on commit
//! - uniqueness rules (one invoice per source, unique price code per type,
//!   one active appointment price) are checked on write and again on commit
//! - dropping a unit without committing discards its writes
//!
//! Identifiers come from sequences that are never rolled back, so gaps are
//! possible, as with database sequences.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::debug;

use core_kernel::{
    AdapterHealth, AppointmentId, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId,
    InvoiceItemId, LabRequestId, Money, PaymentId, PortError, PriceId,
};

use crate::catalog::{NewPriceListing, PriceListing, PriceQuery, PriceType};
use crate::clinical::{Appointment, BillingSource, LabRequest};
use crate::invoice::{Invoice, InvoiceItem, InvoiceQuery, NewInvoice};
use crate::payment::{NewPayment, Payment, PaymentQuery};
use crate::ports::{BillingStore, BillingTx};

/// Operations that can be made to fail once, for atomicity tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    MarkPaid,
    InsertInvoice,
    InsertPayment,
    SetInvoicePaid,
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Appointment(AppointmentId),
    LabRequest(LabRequestId),
    Price(PriceId),
    Invoice(InvoiceId),
}

#[derive(Debug, Default)]
struct Sequences {
    price: i64,
    invoice: i64,
    item: i64,
    payment: i64,
}

impl Sequences {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Tables {
    appointments: BTreeMap<AppointmentId, Appointment>,
    lab_requests: BTreeMap<LabRequestId, LabRequest>,
    prices: BTreeMap<PriceId, PriceListing>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    payments: BTreeMap<PaymentId, Payment>,
    sequences: Sequences,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    armed: Mutex<HashSet<FailPoint>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn trip(&self, point: FailPoint) -> Result<(), PortError> {
        if guard(&self.armed).remove(&point) {
            debug!(?point, "injected failure");
            return Err(PortError::internal(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    fn row_lock(&self, key: RowKey) -> Arc<RowMutex<()>> {
        guard(&self.row_locks)
            .entry(key)
            .or_insert_with(|| Arc::new(RowMutex::new(())))
            .clone()
    }
}

/// Billing store kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    shared: Arc<Shared>,
}

impl InMemoryBillingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of the given operation fail with an internal error
    pub fn fail_next(&self, point: FailPoint) {
        guard(&self.shared.armed).insert(point);
    }

    /// Inserts or replaces an appointment
    pub fn put_appointment(&self, appointment: Appointment) {
        guard(&self.shared.tables)
            .appointments
            .insert(appointment.id, appointment);
    }

    /// Inserts or replaces a lab request
    pub fn put_lab_request(&self, lab_request: LabRequest) {
        guard(&self.shared.tables)
            .lab_requests
            .insert(lab_request.id, lab_request);
    }

    /// Inserts or replaces a listing with an explicit id, bypassing catalog rules
    pub fn put_price(&self, listing: PriceListing) {
        let mut tables = guard(&self.shared.tables);
        tables.sequences.price = tables.sequences.price.max(listing.id.value());
        tables.prices.insert(listing.id, listing);
    }

    /// Number of committed invoices
    pub fn invoice_count(&self) -> usize {
        guard(&self.shared.tables).invoices.len()
    }

    /// Number of committed payments
    pub fn payment_count(&self) -> usize {
        guard(&self.shared.tables).payments.len()
    }
}

impl DomainPort for InMemoryBillingStore {}

#[async_trait]
impl HealthCheckable for InMemoryBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-billing".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, PortError> {
        self.shared.trip(FailPoint::Begin)?;
        Ok(Box::new(InMemoryTx {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            staged: Staged::default(),
            finished: false,
        }))
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(guard(&self.shared.tables).invoices.get(&id).cloned())
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let tables = guard(&self.shared.tables);
        Ok(tables
            .invoices
            .values()
            .rev()
            .filter(|invoice| query.matches(invoice))
            .cloned()
            .collect())
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError> {
        let tables = guard(&self.shared.tables);
        Ok(tables
            .payments
            .values()
            .filter(|payment| query.matches(payment))
            .cloned()
            .collect())
    }

    async fn list_prices(&self, query: &PriceQuery) -> Result<Vec<PriceListing>, PortError> {
        let tables = guard(&self.shared.tables);
        Ok(tables
            .prices
            .values()
            .filter(|listing| query.matches(listing))
            .cloned()
            .collect())
    }

    async fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, PortError> {
        Ok(guard(&self.shared.tables).appointments.get(&id).cloned())
    }

    async fn get_lab_request(&self, id: LabRequestId) -> Result<Option<LabRequest>, PortError> {
        Ok(guard(&self.shared.tables).lab_requests.get(&id).cloned())
    }
}

/// Writes made by a unit that are not yet visible to others
#[derive(Debug, Default)]
struct Staged {
    appointments: HashMap<AppointmentId, Appointment>,
    lab_requests: HashMap<LabRequestId, LabRequest>,
    prices: BTreeMap<PriceId, PriceListing>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    payments: Vec<Payment>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.appointments.is_empty()
            && self.lab_requests.is_empty()
            && self.prices.is_empty()
            && self.invoices.is_empty()
            && self.payments.is_empty()
    }
}

struct InMemoryTx {
    shared: Arc<Shared>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
    finished: bool,
}

impl InMemoryTx {
    fn ensure_open(&self) -> Result<(), PortError> {
        if self.finished {
            return Err(PortError::internal("unit of work already finished"));
        }
        Ok(())
    }

    async fn lock_row(&mut self, key: RowKey) -> Result<(), PortError> {
        self.ensure_open()?;
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let lock = self.shared.row_lock(key);
        let row_guard = lock.lock_owned().await;
        self.held.insert(key, row_guard);
        Ok(())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        guard(&self.shared.tables)
    }

    fn appointment(&self, id: AppointmentId) -> Option<Appointment> {
        self.staged
            .appointments
            .get(&id)
            .cloned()
            .or_else(|| self.tables().appointments.get(&id).cloned())
    }

    fn lab_request(&self, id: LabRequestId) -> Option<LabRequest> {
        self.staged
            .lab_requests
            .get(&id)
            .cloned()
            .or_else(|| self.tables().lab_requests.get(&id).cloned())
    }

    fn price(&self, id: PriceId) -> Option<PriceListing> {
        self.staged
            .prices
            .get(&id)
            .cloned()
            .or_else(|| self.tables().prices.get(&id).cloned())
    }

    fn invoice(&self, id: InvoiceId) -> Option<Invoice> {
        self.staged
            .invoices
            .get(&id)
            .cloned()
            .or_else(|| self.tables().invoices.get(&id).cloned())
    }

    /// Committed listings overlaid with this unit's staged ones
    fn visible_prices(&self) -> BTreeMap<PriceId, PriceListing> {
        let mut prices = self.tables().prices.clone();
        for (id, listing) in &self.staged.prices {
            prices.insert(*id, listing.clone());
        }
        prices
    }

    fn finish(&mut self) {
        self.finished = true;
        self.staged = Staged::default();
        self.held.clear();
    }
}

fn price_rule_violation<'a>(
    listing: &PriceListing,
    others: impl Iterator<Item = &'a PriceListing>,
) -> Option<String> {
    for other in others.filter(|o| o.id != listing.id && o.price_type == listing.price_type) {
        if other.code == listing.code {
            return Some(format!(
                "{} price code '{}' already exists",
                listing.price_type, listing.code
            ));
        }
        if listing.price_type == PriceType::Appointment && listing.active && other.active {
            return Some(format!("{} is already the active APPOINTMENT price", other.id));
        }
    }
    None
}

fn source_taken<'a>(
    invoice_id: InvoiceId,
    source: BillingSource,
    others: impl Iterator<Item = &'a Invoice>,
) -> bool {
    others
        .filter(|other| other.id != invoice_id)
        .any(|other| other.source == Some(source))
}

/// Re-checks uniqueness rules against committed state and publishes the writes
fn apply_staged(shared: &Shared, staged: Staged) -> Result<(), PortError> {
    let mut tables = guard(&shared.tables);

    for listing in staged.prices.values() {
        if let Some(violation) = price_rule_violation(listing, tables.prices.values()) {
            return Err(PortError::conflict(violation));
        }
    }
    for invoice in staged.invoices.values() {
        if let Some(source) = invoice.source {
            if source_taken(invoice.id, source, tables.invoices.values()) {
                return Err(PortError::conflict(format!("{} is already invoiced", source)));
            }
        }
    }

    tables.appointments.extend(staged.appointments);
    tables.lab_requests.extend(staged.lab_requests);
    tables.prices.extend(staged.prices);
    tables.invoices.extend(staged.invoices);
    tables
        .payments
        .extend(staged.payments.into_iter().map(|payment| (payment.id, payment)));
    Ok(())
}

#[async_trait]
impl BillingTx for InMemoryTx {
    async fn lock_appointment(&mut self, id: AppointmentId) -> Result<Option<Appointment>, PortError> {
        self.lock_row(RowKey::Appointment(id)).await?;
        Ok(self.appointment(id))
    }

    async fn mark_appointment_paid(&mut self, id: AppointmentId) -> Result<(), PortError> {
        self.shared.trip(FailPoint::MarkPaid)?;
        self.lock_row(RowKey::Appointment(id)).await?;
        let mut appointment = self
            .appointment(id)
            .ok_or_else(|| PortError::not_found("Appointment", id))?;
        if appointment.is_paid {
            return Err(PortError::conflict(format!("{} is already paid", id)));
        }
        appointment.is_paid = true;
        self.staged.appointments.insert(id, appointment);
        Ok(())
    }

    async fn lock_lab_request(&mut self, id: LabRequestId) -> Result<Option<LabRequest>, PortError> {
        self.lock_row(RowKey::LabRequest(id)).await?;
        Ok(self.lab_request(id))
    }

    async fn mark_lab_request_paid(&mut self, id: LabRequestId) -> Result<(), PortError> {
        self.shared.trip(FailPoint::MarkPaid)?;
        self.lock_row(RowKey::LabRequest(id)).await?;
        let mut lab_request = self
            .lab_request(id)
            .ok_or_else(|| PortError::not_found("LabRequest", id))?;
        if lab_request.is_paid {
            return Err(PortError::conflict(format!("{} is already paid", id)));
        }
        lab_request.is_paid = true;
        self.staged.lab_requests.insert(id, lab_request);
        Ok(())
    }

    async fn active_price(&mut self, price_type: PriceType) -> Result<Option<PriceListing>, PortError> {
        self.ensure_open()?;
        Ok(self
            .visible_prices()
            .into_values()
            .find(|listing| listing.price_type == price_type && listing.active))
    }

    async fn price_by_id(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError> {
        self.ensure_open()?;
        Ok(self.price(id))
    }

    async fn lock_price(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError> {
        self.lock_row(RowKey::Price(id)).await?;
        Ok(self.price(id))
    }

    async fn insert_price(&mut self, new: &NewPriceListing) -> Result<PriceListing, PortError> {
        self.ensure_open()?;
        let now = Utc::now();
        let id = {
            let mut tables = self.tables();
            PriceId::new(Sequences::next(&mut tables.sequences.price))
        };
        let listing = PriceListing {
            id,
            price_type: new.price_type,
            code: new.code.clone(),
            name: new.name.clone(),
            amount: new.amount,
            active: new.active,
            created_at: now,
            updated_at: now,
        };

        if let Some(violation) = price_rule_violation(&listing, self.visible_prices().values()) {
            return Err(PortError::conflict(violation));
        }
        self.staged.prices.insert(id, listing.clone());
        Ok(listing)
    }

    async fn update_price(&mut self, listing: &PriceListing) -> Result<PriceListing, PortError> {
        self.lock_row(RowKey::Price(listing.id)).await?;
        let mut stored = self
            .price(listing.id)
            .ok_or_else(|| PortError::not_found("Price", listing.id))?;
        stored.name = listing.name.clone();
        stored.amount = listing.amount;
        stored.active = listing.active;
        stored.updated_at = listing.updated_at;

        if let Some(violation) = price_rule_violation(&stored, self.visible_prices().values()) {
            return Err(PortError::conflict(violation));
        }
        self.staged.prices.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, PortError> {
        self.ensure_open()?;
        self.shared.trip(FailPoint::InsertInvoice)?;

        let (id, item_ids) = {
            let mut tables = self.tables();
            let id = InvoiceId::new(Sequences::next(&mut tables.sequences.invoice));
            if let Some(source) = new.source() {
                if source_taken(id, source, tables.invoices.values()) {
                    return Err(PortError::conflict(format!("{} is already invoiced", source)));
                }
            }
            let item_ids: Vec<InvoiceItemId> = new
                .items()
                .iter()
                .map(|_| InvoiceItemId::new(Sequences::next(&mut tables.sequences.item)))
                .collect();
            (id, item_ids)
        };
        if let Some(source) = new.source() {
            if source_taken(id, source, self.staged.invoices.values()) {
                return Err(PortError::conflict(format!("{} is already invoiced", source)));
            }
        }

        let items = new
            .items()
            .iter()
            .zip(item_ids)
            .map(|(item, item_id)| InvoiceItem {
                id: item_id,
                invoice_id: id,
                description: item.description.clone(),
                amount: item.amount,
            })
            .collect();
        let invoice = Invoice {
            id,
            patient_id: new.patient_id(),
            source: new.source(),
            total_amount: new.total_amount(),
            is_paid: false,
            created_at: Utc::now(),
            items,
        };

        self.lock_row(RowKey::Invoice(id)).await?;
        self.staged.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.lock_row(RowKey::Invoice(id)).await?;
        Ok(self.invoice(id))
    }

    async fn payments_total(&mut self, id: InvoiceId) -> Result<Money, PortError> {
        self.ensure_open()?;
        let committed: Money = self
            .tables()
            .payments
            .values()
            .filter(|payment| payment.invoice_id == id)
            .map(|payment| payment.amount)
            .sum();
        let staged: Money = self
            .staged
            .payments
            .iter()
            .filter(|payment| payment.invoice_id == id)
            .map(|payment| payment.amount)
            .sum();
        Ok(committed + staged)
    }

    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, PortError> {
        self.ensure_open()?;
        self.shared.trip(FailPoint::InsertPayment)?;
        if !new.amount.is_positive() {
            return Err(PortError::validation_field("payment amount must be positive", "amount"));
        }
        if self.invoice(new.invoice_id).is_none() {
            return Err(PortError::validation_field(
                format!("{} does not exist", new.invoice_id),
                "invoice_id",
            ));
        }

        let id = {
            let mut tables = self.tables();
            PaymentId::new(Sequences::next(&mut tables.sequences.payment))
        };
        let payment = Payment {
            id,
            invoice_id: new.invoice_id,
            amount: new.amount,
            cashier_id: new.cashier_id,
            created_at: Utc::now(),
        };
        self.staged.payments.push(payment.clone());
        Ok(payment)
    }

    async fn set_invoice_paid(&mut self, id: InvoiceId, is_paid: bool) -> Result<(), PortError> {
        self.shared.trip(FailPoint::SetInvoicePaid)?;
        self.lock_row(RowKey::Invoice(id)).await?;
        let mut invoice = self
            .invoice(id)
            .ok_or_else(|| PortError::not_found("Invoice", id))?;
        invoice.is_paid = is_paid;
        self.staged.invoices.insert(id, invoice);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PortError> {
        self.ensure_open()?;
        if let Err(err) = self.shared.trip(FailPoint::Commit) {
            self.finish();
            return Err(err);
        }
        if self.staged.is_empty() {
            self.finish();
            return Ok(());
        }

        let staged = std::mem::take(&mut self.staged);
        let applied = apply_staged(&self.shared, staged);

        // Row locks are released only after the writes are visible.
        self.finish();
        applied
    }

    async fn rollback(&mut self) -> Result<(), PortError> {
        self.finish();
        Ok(())
    }
}
