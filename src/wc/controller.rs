// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The workflow controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::storage::{fields, CompositeFixedWidthIndex, FieldValue, Record};
use crate::wire::{ErrCode, TxnStatus, TxnStatusResponse, Xid};

use super::api::{RmApi, TmApi};
use super::config::WcConfig;
use super::error::{RemoteError, WcError, WcErrorKind};

/// Widths of the reservation key columns: customer name, reservation
/// type, and the reserved resource's key.
const RESERVATION_KEY_WIDTHS: [usize; 3] = [24, 8, 16];

/// What a reservation reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationType {
    Flight,
    Hotel,
    Car,
}

impl ReservationType {
    /// Wire value stored in the reservation record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flight => "FLIGHT",
            Self::Hotel => "HOTEL",
            Self::Car => "CAR",
        }
    }

    fn resource(self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Hotel => "hotel",
            Self::Car => "car",
        }
    }
}

/// Result of a successful reservation.
#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    /// Encoded primary key of the reservation record.
    pub reservation_key: String,
    /// Remaining availability after the decrement.
    pub num_avail: i64,
}

/// Client handles to the four resource managers.
pub struct RmHandles {
    pub flights: Arc<dyn RmApi>,
    pub hotels: Arc<dyn RmApi>,
    pub cars: Arc<dyn RmApi>,
    pub customers: Arc<dyn RmApi>,
}

/// Orchestrator of multi-participant business operations.
///
/// Stateless apart from the availability flag: every verb takes the
/// transaction id explicitly and propagates it downstream. See the module
/// docs for the auto-abort and `IN_DOUBT` policies.
pub struct WorkflowController {
    tm: Arc<dyn TmApi>,
    rms: RmHandles,
    reservation_index: CompositeFixedWidthIndex,
    config: WcConfig,
    available: AtomicBool,
}

impl WorkflowController {
    pub fn new(tm: Arc<dyn TmApi>, rms: RmHandles, config: WcConfig) -> Self {
        Self {
            tm,
            rms,
            reservation_index: CompositeFixedWidthIndex::new(RESERVATION_KEY_WIDTHS.to_vec(), 1),
            config,
            available: AtomicBool::new(true),
        }
    }

    // ---------------------------------------------------------------
    // Transaction control
    // ---------------------------------------------------------------

    pub async fn start(&self) -> Result<Xid, WcError> {
        self.ensure_available()?;
        Ok(self.tm.start().await?)
    }

    /// Commits the transaction, surfacing `IN_DOUBT` when the decision is
    /// not observable within the client-facing deadline.
    pub async fn commit(&self, xid: &Xid) -> Result<TxnStatusResponse, WcError> {
        self.ensure_available()?;

        let result = tokio::time::timeout(self.config.commit_timeout, self.tm.commit(xid)).await;
        match result {
            Ok(Ok(mut response)) => {
                if response.status == TxnStatus::InDoubt && response.message.is_none() {
                    response = response.with_message(Self::IN_DOUBT_GUIDANCE);
                }
                Ok(response)
            }
            Ok(Err(remote)) if remote.code == ErrCode::Timeout => {
                warn!(%xid, "coordinator commit timed out; reporting IN_DOUBT");
                Ok(self.in_doubt(xid))
            }
            Ok(Err(remote)) => Err(WcError::from(remote).with_xid(xid)),
            Err(_) => {
                warn!(%xid, "commit exceeded client deadline; reporting IN_DOUBT");
                Ok(self.in_doubt(xid))
            }
        }
    }

    pub async fn abort(&self, xid: &Xid) -> Result<TxnStatusResponse, WcError> {
        self.ensure_available()?;
        Ok(self.tm.abort(xid).await.map_err(|e| WcError::from(e).with_xid(xid))?)
    }

    pub async fn status(&self, xid: &Xid) -> Result<TxnStatusResponse, WcError> {
        self.ensure_available()?;
        Ok(self.tm.status(xid).await.map_err(|e| WcError::from(e).with_xid(xid))?)
    }

    // ---------------------------------------------------------------
    // Flights
    // ---------------------------------------------------------------

    pub async fn add_flight(
        &self,
        xid: &Xid,
        flight_num: &str,
        price: i64,
        num_seats: i64,
    ) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            Ok(self
                .rms
                .flights
                .create(
                    xid,
                    flight_num,
                    fields([
                        ("price", price),
                        ("numSeats", num_seats),
                        ("numAvail", num_seats),
                    ]),
                )
                .await?)
        })
        .await
    }

    pub async fn delete_flight(&self, xid: &Xid, flight_num: &str) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            self.rms
                .flights
                .remove(xid, flight_num)
                .await
                .map_err(Self::not_found_as("flight", flight_num))
        })
        .await
    }

    pub async fn query_flight(
        &self,
        xid: Option<&Xid>,
        flight_num: &str,
    ) -> Result<Record, WcError> {
        self.ensure_available()?;
        self.rms
            .flights
            .get(xid, flight_num)
            .await
            .map_err(Self::not_found_as("flight", flight_num))
    }

    pub async fn reserve_flight(
        &self,
        xid: &Xid,
        cust_name: &str,
        flight_num: &str,
        quantity: i64,
    ) -> Result<ReservationOutcome, WcError> {
        self.reserve(xid, ReservationType::Flight, flight_num, cust_name, quantity)
            .await
    }

    // ---------------------------------------------------------------
    // Hotels
    // ---------------------------------------------------------------

    pub async fn add_hotel(
        &self,
        xid: &Xid,
        location: &str,
        price: i64,
        num_rooms: i64,
    ) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            Ok(self
                .rms
                .hotels
                .create(
                    xid,
                    location,
                    fields([
                        ("price", price),
                        ("numRooms", num_rooms),
                        ("numAvail", num_rooms),
                    ]),
                )
                .await?)
        })
        .await
    }

    pub async fn delete_hotel(&self, xid: &Xid, location: &str) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            self.rms
                .hotels
                .remove(xid, location)
                .await
                .map_err(Self::not_found_as("hotel", location))
        })
        .await
    }

    pub async fn query_hotel(&self, xid: Option<&Xid>, location: &str) -> Result<Record, WcError> {
        self.ensure_available()?;
        self.rms
            .hotels
            .get(xid, location)
            .await
            .map_err(Self::not_found_as("hotel", location))
    }

    pub async fn reserve_hotel(
        &self,
        xid: &Xid,
        cust_name: &str,
        location: &str,
        quantity: i64,
    ) -> Result<ReservationOutcome, WcError> {
        self.reserve(xid, ReservationType::Hotel, location, cust_name, quantity)
            .await
    }

    // ---------------------------------------------------------------
    // Cars
    // ---------------------------------------------------------------

    pub async fn add_car(
        &self,
        xid: &Xid,
        location: &str,
        price: i64,
        num_cars: i64,
    ) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            Ok(self
                .rms
                .cars
                .create(
                    xid,
                    location,
                    fields([
                        ("price", price),
                        ("numCars", num_cars),
                        ("numAvail", num_cars),
                    ]),
                )
                .await?)
        })
        .await
    }

    pub async fn delete_car(&self, xid: &Xid, location: &str) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            self.rms
                .cars
                .remove(xid, location)
                .await
                .map_err(Self::not_found_as("car", location))
        })
        .await
    }

    pub async fn query_car(&self, xid: Option<&Xid>, location: &str) -> Result<Record, WcError> {
        self.ensure_available()?;
        self.rms
            .cars
            .get(xid, location)
            .await
            .map_err(Self::not_found_as("car", location))
    }

    pub async fn reserve_car(
        &self,
        xid: &Xid,
        cust_name: &str,
        location: &str,
        quantity: i64,
    ) -> Result<ReservationOutcome, WcError> {
        self.reserve(xid, ReservationType::Car, location, cust_name, quantity)
            .await
    }

    // ---------------------------------------------------------------
    // Customers
    // ---------------------------------------------------------------

    pub async fn add_customer(&self, xid: &Xid, cust_name: &str) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            Ok(self
                .rms
                .customers
                .create(xid, cust_name, fields([("custName", cust_name)]))
                .await?)
        })
        .await
    }

    pub async fn delete_customer(&self, xid: &Xid, cust_name: &str) -> Result<(), WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            self.rms
                .customers
                .remove(xid, cust_name)
                .await
                .map_err(Self::not_found_as("customer", cust_name))
        })
        .await
    }

    pub async fn query_customer(
        &self,
        xid: Option<&Xid>,
        cust_name: &str,
    ) -> Result<Record, WcError> {
        self.ensure_available()?;
        self.rms
            .customers
            .get(xid, cust_name)
            .await
            .map_err(Self::not_found_as("customer", cust_name))
    }

    // ---------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------

    /// Probes every downstream endpoint and reports per-endpoint health.
    /// Also lifts a previous [`die`](Self::die), modeling a rebuilt client
    /// set.
    pub async fn reconnect(&self) -> Vec<(String, bool)> {
        let mut report = Vec::new();

        let tm_healthy = tokio::time::timeout(self.config.probe_timeout, self.tm.health())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        report.push(("tm".to_string(), tm_healthy));

        for rm in [
            &self.rms.flights,
            &self.rms.hotels,
            &self.rms.cars,
            &self.rms.customers,
        ] {
            let healthy = tokio::time::timeout(self.config.probe_timeout, rm.health())
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
            report.push((rm.endpoint().to_string(), healthy));
        }

        self.available.store(true, Ordering::SeqCst);
        info!(?report, "reconnect probe finished");
        report
    }

    /// Marks the controller unavailable: every subsequent call fails with
    /// a 503-mapped error. Used by failure-injection tests.
    pub fn die(&self) {
        warn!("workflow controller marked unavailable");
        self.available.store(false, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    const IN_DOUBT_GUIDANCE: &'static str =
        "commit outcome unknown; poll the transaction status until a terminal state is observed";

    /// The reserve contract: verify the customer, verify and decrement the
    /// inventory, insert the reservation record, all under one
    /// transaction spanning two resource managers.
    #[instrument(skip(self), fields(xid = %xid))]
    async fn reserve(
        &self,
        xid: &Xid,
        rtype: ReservationType,
        resv_key: &str,
        cust_name: &str,
        quantity: i64,
    ) -> Result<ReservationOutcome, WcError> {
        self.ensure_available()?;
        self.guarded(xid, async {
            self.rms
                .customers
                .get(Some(xid), cust_name)
                .await
                .map_err(Self::not_found_as("customer", cust_name))?;

            let inventory_rm = self.inventory(rtype);
            let inventory = inventory_rm
                .get(Some(xid), resv_key)
                .await
                .map_err(Self::not_found_as(rtype.resource(), resv_key))?;

            let available = inventory.int_field("numAvail").unwrap_or(0);
            if available < quantity {
                return Err(WcError::new(WcErrorKind::InsufficientAvailability {
                    resource: rtype.resource(),
                    key: resv_key.to_string(),
                    requested: quantity,
                    available,
                }));
            }

            inventory_rm
                .patch(xid, resv_key, fields([("numAvail", available - quantity)]))
                .await?;

            // The reservation record lives on the customer RM, keyed by the
            // fixed-width (custName, resvType, resvKey) encoding.
            let key = self
                .reservation_index
                .encode(&[cust_name, rtype.as_str(), resv_key])
                .map_err(|err| WcError::new(WcErrorKind::Validation(err.to_string())))?;
            self.rms
                .customers
                .create(
                    xid,
                    key.as_str(),
                    fields([
                        ("custName", FieldValue::from(cust_name)),
                        ("resvType", FieldValue::from(rtype.as_str())),
                        ("resvKey", FieldValue::from(resv_key)),
                        ("count", FieldValue::from(quantity)),
                    ]),
                )
                .await?;

            info!(
                customer = cust_name,
                resource = rtype.resource(),
                key = resv_key,
                remaining = available - quantity,
                "reservation staged"
            );
            Ok(ReservationOutcome {
                reservation_key: key.as_str().to_string(),
                num_avail: available - quantity,
            })
        })
        .await
    }

    fn inventory(&self, rtype: ReservationType) -> &Arc<dyn RmApi> {
        match rtype {
            ReservationType::Flight => &self.rms.flights,
            ReservationType::Hotel => &self.rms.hotels,
            ReservationType::Car => &self.rms.cars,
        }
    }

    /// The auto-abort pipeline: every downstream failure under an active
    /// transaction flows through here exactly once.
    async fn guarded<T>(
        &self,
        xid: &Xid,
        op: impl std::future::Future<Output = Result<T, WcError>>,
    ) -> Result<T, WcError> {
        match op.await {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = err.with_xid(xid);
                if !self.config.auto_abort {
                    return Err(err);
                }
                debug!(%xid, error = %err, "auto-aborting transaction after downstream failure");
                match self.tm.abort(xid).await {
                    Ok(_) => Err(err.aborted()),
                    Err(abort_err) => {
                        error!(%xid, %abort_err, "auto-abort failed");
                        Err(err)
                    }
                }
            }
        }
    }

    fn in_doubt(&self, xid: &Xid) -> TxnStatusResponse {
        TxnStatusResponse::new(xid.clone(), TxnStatus::InDoubt)
            .with_message(Self::IN_DOUBT_GUIDANCE)
    }

    fn ensure_available(&self) -> Result<(), WcError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(WcError::new(WcErrorKind::Unavailable))
        }
    }

    fn not_found_as(
        resource: &'static str,
        key: &str,
    ) -> impl FnOnce(RemoteError) -> WcError {
        let key = key.to_string();
        move |remote| {
            if remote.code == ErrCode::KeyNotFound {
                WcError::new(WcErrorKind::ResourceNotFound { resource, key })
            } else {
                WcError::from(remote)
            }
        }
    }
}
