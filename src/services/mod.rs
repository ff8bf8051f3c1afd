pub mod razorpay_service;
