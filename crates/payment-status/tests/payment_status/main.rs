mod get_payment_test;
mod helpers;
