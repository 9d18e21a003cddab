use super::invocation::{FromInvocation, HubInvocation};
use crate::error::SignalRClientError;
use std::marker::PhantomData;

pub(crate) trait HubMethod: Send + Sync {
    fn call(&self, request: HubInvocation) -> Result<(), SignalRClientError>;
}

/// Represents a client-side hub method
///
/// Implemented for closures taking up to 12 arguments that implement
/// [`FromInvocation`]. Handlers run on the connection's callback queue, one at
/// a time, so they should not block. Spawn a task for longer work.
pub trait Handler<Args>: Send + Sync + 'static {
    fn call(&self, request: HubInvocation) -> Result<(), SignalRClientError>;
}

pub(crate) struct HandlerWrapper<H, Args> {
    handler: H,
    _marker: PhantomData<fn() -> Args>,
}

impl<H, Args> HubMethod for HandlerWrapper<H, Args>
where
    H: Handler<Args>,
{
    fn call(&self, request: HubInvocation) -> Result<(), SignalRClientError> {
        self.handler.call(request)
    }
}

impl<H, Args> From<H> for HandlerWrapper<H, Args>
where
    H: Handler<Args>,
{
    fn from(handler: H) -> Self {
        HandlerWrapper {
            handler,
            _marker: Default::default(),
        }
    }
}

impl<Func> Handler<()> for Func
where
    Func: Fn() + Send + Sync + 'static,
{
    fn call(&self, _request: HubInvocation) -> Result<(), SignalRClientError> {
        (self)();
        Ok(())
    }
}

macro_rules! implement_handler {
    ($($ty:ident),+) => {
        #[allow(non_snake_case)]
        impl<Func, $($ty,)+> Handler<($($ty,)+)> for Func
        where
            Func: Fn($($ty,)+) + Send + Sync + 'static,
            $(
                $ty: FromInvocation + 'static,
            )+
        {
            fn call(&self, mut request: HubInvocation) -> Result<(), SignalRClientError> {
                $(
                    let $ty = $ty::try_from_invocation(&mut request)?;
                )+

                (self)($($ty,)+);

                Ok(())
            }
        }
    };
}

implement_handler!(T1);
implement_handler!(T1, T2);
implement_handler!(T1, T2, T3);
implement_handler!(T1, T2, T3, T4);
implement_handler!(T1, T2, T3, T4, T5);
implement_handler!(T1, T2, T3, T4, T5, T6);
implement_handler!(T1, T2, T3, T4, T5, T6, T7);
implement_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
implement_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
implement_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
implement_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
implement_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
