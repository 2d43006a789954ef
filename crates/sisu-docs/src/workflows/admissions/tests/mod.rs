mod common;
mod notifier;
mod routing;
