use std::sync::{mpsc, Arc};
use std::thread;

use actix_web::dev::{Service, ServerHandle};
use actix_web::{web, App, HttpResponse, HttpServer};
use tokio::runtime::Runtime;

use crate::config::MatchPolicy;
use crate::osrm::RoutingService;
use crate::session::{build_trip_view, ExplorerSession};
use crate::trip_data::Dataset;

pub type SharedRoutingService = Arc<dyn RoutingService + Send + Sync>;

// App state shared by all workers, read-only
struct AppState {
    dataset: Arc<Dataset>,
    service: SharedRoutingService,
    policy: MatchPolicy,
}

async fn list_cycles(data: web::Data<AppState>) -> HttpResponse {
    let cycle_ids: Vec<&str> = data.dataset.cycle_ids().collect();
    HttpResponse::Ok().json(cycle_ids)
}

async fn serve_cycle_view(index: web::Path<usize>, data: web::Data<AppState>) -> HttpResponse {
    let index = index.into_inner();
    if index >= data.dataset.trips().len() {
        return HttpResponse::NotFound().finish();
    }
    let dataset = data.dataset.clone();
    let service = data.service.clone();
    let policy = data.policy.clone();
    // routing calls are blocking, keep them off the async workers
    let view = web::block(move || {
        let trip = &dataset.trips()[index];
        build_trip_view(trip, service.as_ref(), &policy)
    })
    .await;
    match view {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => {
            error!("failed to build view for cycle {}: {}", index, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn list_vehicles(data: web::Data<AppState>) -> HttpResponse {
    let session = ExplorerSession::new(data.dataset.clone(), data.policy.clone());
    HttpResponse::Ok().json(session.vehicle_models())
}

async fn serve_trip_table(model: web::Path<String>, data: web::Data<AppState>) -> HttpResponse {
    let session = ExplorerSession::new(data.dataset.clone(), data.policy.clone());
    if data.dataset.sequence(&model).is_none() {
        return HttpResponse::NotFound().finish();
    }
    HttpResponse::Ok().json(session.trip_table(&model))
}

/// Serves trip views as JSON for a web map widget.
pub struct MapServer {
    host: String,
    port: u16,
    state: Option<(Arc<Dataset>, SharedRoutingService, MatchPolicy)>,
    handle: Option<thread::JoinHandle<()>>,
    server_handle: Option<ServerHandle>,
}

impl MapServer {
    pub fn new(
        host: &str,
        port: u16,
        dataset: Arc<Dataset>,
        service: SharedRoutingService,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            state: Some((dataset, service, policy)),
            handle: None,
            server_handle: None,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    // Start the server in a separate thread
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some((dataset, service, policy)) = self.state.clone() else {
            return Err(std::io::Error::other("server already started"));
        };
        let host = self.host.clone();
        let port = self.port;

        // Create a channel to report the bound port (or the bind failure)
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let app_state = web::Data::new(AppState {
                dataset,
                service,
                policy,
            });

            let runtime = match Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(async move {
                info!("Setting up server routes...");
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(app_state.clone())
                        .wrap_fn(|req, srv| {
                            info!("Incoming request: {} {}", req.method(), req.uri());
                            srv.call(req)
                        })
                        .route("/cycles", web::get().to(list_cycles))
                        .route("/cycles/{index}/view", web::get().to(serve_cycle_view))
                        .route("/vehicles", web::get().to(list_vehicles))
                        .route("/vehicles/{model}/trips", web::get().to(serve_trip_table))
                })
                .workers(2)
                .bind(format!("{}:{}", host, port));
                let server = match server {
                    Ok(server) => server,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };

                // If port was 0, report the one the OS picked
                let actual_port = server
                    .addrs()
                    .first()
                    .map(|addr| addr.port())
                    .unwrap_or(port);
                let server = server.run();
                let _ = tx.send(Ok((actual_port, server.handle())));

                info!("Server bound successfully to {}:{}", host, actual_port);
                if let Err(e) = server.await {
                    error!("map server stopped: {}", e);
                }
            });
        });

        let (port, server_handle) = rx
            .recv()
            .map_err(|_| std::io::Error::other("map server thread exited"))??;
        self.port = port;
        self.state = None;
        self.server_handle = Some(server_handle);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(server_handle) = self.server_handle.take() {
            match tokio::runtime::Builder::new_current_thread().build() {
                Ok(runtime) => runtime.block_on(server_handle.stop(true)),
                Err(e) => error!("failed to stop map server: {}", e),
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("map server thread panicked");
            }
        }
    }
}

impl Drop for MapServer {
    fn drop(&mut self) {
        self.stop();
    }
}
