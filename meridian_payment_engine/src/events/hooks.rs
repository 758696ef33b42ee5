use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    FundFlowEvent,
    Handler,
    SettleCyclePostedEvent,
    TransactionSettledEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub fund_flow_producer: Vec<EventProducer<FundFlowEvent>>,
    pub transaction_settled_producer: Vec<EventProducer<TransactionSettledEvent>>,
    pub cycle_posted_producer: Vec<EventProducer<SettleCyclePostedEvent>>,
}

pub struct EventHandlers {
    pub on_fund_flow: Option<EventHandler<FundFlowEvent>>,
    pub on_transaction_settled: Option<EventHandler<TransactionSettledEvent>>,
    pub on_cycle_posted: Option<EventHandler<SettleCyclePostedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_fund_flow = hooks.on_fund_flow.map(|f| EventHandler::new(buffer_size, f));
        let on_transaction_settled = hooks.on_transaction_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_cycle_posted = hooks.on_cycle_posted.map(|f| EventHandler::new(buffer_size, f));
        Self { on_fund_flow, on_transaction_settled, on_cycle_posted }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_fund_flow {
            result.fund_flow_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transaction_settled {
            result.transaction_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_cycle_posted {
            result.cycle_posted_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_fund_flow {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_transaction_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_cycle_posted {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_fund_flow: Option<Handler<FundFlowEvent>>,
    pub on_transaction_settled: Option<Handler<TransactionSettledEvent>>,
    pub on_cycle_posted: Option<Handler<SettleCyclePostedEvent>>,
}

impl EventHooks {
    pub fn on_fund_flow<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FundFlowEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_fund_flow = Some(Arc::new(f));
        self
    }

    pub fn on_transaction_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_settled = Some(Arc::new(f));
        self
    }

    pub fn on_cycle_posted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettleCyclePostedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_cycle_posted = Some(Arc::new(f));
        self
    }
}
